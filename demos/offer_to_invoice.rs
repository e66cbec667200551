use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;
use werkbeleg::catalog::InMemoryCatalog;
use werkbeleg::core::*;
use werkbeleg::export::*;
use werkbeleg::lifecycle::*;
use werkbeleg::store::MemoryStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let catalog = InMemoryCatalog::new()
        .with_client("k-100", ClientSnapshot::named("Bäckerei Hofmann"))
        .with_material("fliese-30x60", dec!(11.40))
        .with_personnel("meister-1", dec!(48));
    let today = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
    let service = DocumentService::new(
        Arc::new(MemoryStore::new()),
        Catalogs::from_one(catalog),
        EngineConfig::default(),
    )
    .with_clock(move || today);

    // Offer with two rates and a document discount
    let input = NewDocumentBuilder::new("k-100", NaiveDate::from_ymd_opt(2025, 6, 2).unwrap())
        .tax_keys(german_defaults())
        .add_line(
            LineItemBuilder::new(1, "Fliesen 30x60", dec!(24), "m²", dec!(29.90), "DE19")
                .material("fliese-30x60")
                .build(),
        )
        .add_line(
            LineItemBuilder::new(2, "Verlegen", dec!(12), "Std", dec!(68), "DE19")
                .labor("meister-1")
                .build(),
        )
        .add_line(LineItemBuilder::new(3, "Pflegeanleitung", dec!(1), "Stk", dec!(12), "DE7").build())
        .additional_discount(dec!(50))
        .build()
        .expect("offer input valid");

    let offer = service.create_offer(input).await.expect("offer created");
    let offer_id = offer.base().id().clone();
    let totals = offer.base().totals();
    println!("Angebot {}", offer.base().number());
    for (key, vat) in &totals.vat_by_key {
        println!("  USt {key}: {vat}");
    }
    println!("  Brutto: {}", totals.grand_total_gross);

    let summary = service
        .recalculate_costing(&offer_id, None)
        .await
        .expect("costing");
    let figures = summary.figures();
    println!(
        "  Kosten {} / Verkauf {} / Marge {} ({} %)",
        figures.cost_total, figures.sell_total, figures.margin_value, figures.margin_pct
    );

    for state in [OfferState::Sent, OfferState::Accepted] {
        service
            .transition(&offer_id, DocumentState::Offer(state))
            .await
            .expect("offer transition");
    }

    let order = service
        .convert_offer_to_order(&offer_id)
        .await
        .expect("order created");
    println!(
        "Auftrag {} (Kostenbasis gesperrt: {})",
        order.base().number(),
        order.calc_summary().is_some_and(|s| s.snapshot_locked())
    );

    let due = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
    let invoice = service
        .convert_order_to_invoice(order.base().id(), Some(due))
        .await
        .expect("invoice created");
    let invoice_id = invoice.base().id().clone();
    service
        .transition(&invoice_id, DocumentState::Invoice(InvoiceState::Sent))
        .await
        .expect("invoice sent");

    let invoice = service
        .record_payment(&invoice_id, dec!(500), PaymentMethod::Bank)
        .await
        .expect("payment recorded");
    println!("Rechnung {}: offen {}", invoice.base().number(), invoice.open_amount());

    let payments = service.payments(&invoice_id).await.expect("payments");
    let config = ExportConfigBuilder::new().include_payments(true).build();

    println!("\n=== Format A ===");
    print!("{}", to_extf(std::slice::from_ref(&invoice), &config).expect("format A export"));
    println!("\n=== Format B ===");
    print!("{}", to_journal(&[invoice], &payments, &config).expect("format B export"));
}
