use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use werkbeleg::core::*;
use werkbeleg::costing::calculate_summary;
use werkbeleg::store::{MemoryStore, NumberGenerator};

fn lines(n: u32) -> Vec<LineItem> {
    let keys = ["DE19", "DE7", "DE0"];
    (1..=n)
        .map(|i| {
            let mut builder = LineItemBuilder::new(
                i,
                format!("Position {i}"),
                dec!(2.5),
                "Stk",
                Decimal::new(999 + i64::from(i), 2),
                keys[(i % 3) as usize],
            )
            .item_type(if i % 2 == 0 { ItemType::Labor } else { ItemType::Material })
            .unit_cost(dec!(4.75));
            if i % 4 == 0 {
                builder = builder.discount_pct(dec!(12.5));
            }
            builder.build()
        })
        .collect()
}

fn bench_totals_10_lines(c: &mut Criterion) {
    let items = lines(10);
    let keys = german_defaults();
    c.bench_function("compute_totals_10_lines", |b| {
        b.iter(|| black_box(compute_totals(black_box(&items), &keys, dec!(15))));
    });
}

fn bench_totals_1000_lines(c: &mut Criterion) {
    let items = lines(1000);
    let keys = german_defaults();
    c.bench_function("compute_totals_1000_lines", |b| {
        b.iter(|| black_box(compute_totals(black_box(&items), &keys, dec!(250))));
    });
}

fn bench_cost_summary_1000_lines(c: &mut Criterion) {
    let items = lines(1000);
    c.bench_function("calculate_summary_1000_lines", |b| {
        b.iter(|| black_box(calculate_summary(black_box(&items), dec!(12))));
    });
}

fn bench_issue_number(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let numbers = NumberGenerator::new(Arc::new(MemoryStore::new()), &EngineConfig::default());
    c.bench_function("issue_number_memory_store", |b| {
        b.iter(|| black_box(rt.block_on(numbers.issue_number(DocumentType::Invoice, 2025))));
    });
}

criterion_group!(
    benches,
    bench_totals_10_lines,
    bench_totals_1000_lines,
    bench_cost_summary_1000_lines,
    bench_issue_number,
);
criterion_main!(benches);
