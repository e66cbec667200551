//! Document numbers under concurrency and conflicts.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use werkbeleg::catalog::InMemoryCatalog;
use werkbeleg::core::*;
use werkbeleg::lifecycle::{Catalogs, DocumentService};
use werkbeleg::store::{MemoryStore, NumberGenerator, Store};

fn generator(store: &MemoryStore) -> NumberGenerator {
    let config = EngineConfigBuilder::new().retry_backoff_ms(1).build();
    NumberGenerator::new(Arc::new(store.clone()), &config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_concurrent_invoice_numbers_differ() {
    let store = MemoryStore::new();
    let numbers = generator(&store);

    let a = tokio::spawn({
        let numbers = numbers.clone();
        async move { numbers.issue_number(DocumentType::Invoice, 2025).await }
    });
    let b = tokio::spawn({
        let numbers = numbers.clone();
        async move { numbers.issue_number(DocumentType::Invoice, 2025).await }
    });
    let a = a.await.unwrap().unwrap().to_string();
    let b = b.await.unwrap().unwrap().to_string();

    let got: HashSet<_> = [a, b].into_iter().collect();
    let want: HashSet<_> = ["2025-0001".to_string(), "2025-0002".to_string()].into_iter().collect();
    assert_eq!(got, want);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_callers_get_distinct_numbers() {
    let store = MemoryStore::new();
    let numbers = generator(&store);

    let handles: Vec<_> = (0..64)
        .map(|_| {
            let numbers = numbers.clone();
            tokio::spawn(async move { numbers.issue_number(DocumentType::Order, 2025).await })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let number = handle.await.unwrap().unwrap();
        assert!(seen.insert(number), "duplicate number {number}");
    }
    assert_eq!(seen.len(), 64);
    assert_eq!(seen.iter().map(|n| n.seq()).max(), Some(64));
}

#[tokio::test]
async fn sequential_numbers_strictly_increase() {
    let store = MemoryStore::new();
    let numbers = generator(&store);
    let mut last = None;
    for _ in 0..20 {
        let n = numbers.issue_number(DocumentType::Offer, 2025).await.unwrap();
        if let Some(prev) = last {
            assert!(n > prev);
        }
        last = Some(n);
    }
}

#[tokio::test]
async fn counters_are_independent_per_type_and_year() {
    let store = MemoryStore::new();
    let numbers = generator(&store);
    numbers.issue_number(DocumentType::Invoice, 2025).await.unwrap();
    numbers.issue_number(DocumentType::Invoice, 2025).await.unwrap();
    let offer = numbers.issue_number(DocumentType::Offer, 2025).await.unwrap();
    let next_year = numbers.issue_number(DocumentType::Invoice, 2026).await.unwrap();
    assert_eq!(offer.to_string(), "2025-0001");
    assert_eq!(next_year.to_string(), "2026-0001");

    let mut uow = store.begin().await.unwrap();
    let row = uow
        .counter(CounterKey::new(DocumentType::Invoice, 2025))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.seq, 2);
}

#[tokio::test]
async fn padding_follows_config() {
    let store = MemoryStore::new();
    let config = EngineConfigBuilder::new().number_padding(6).build();
    let numbers = NumberGenerator::new(Arc::new(store), &config);
    let n = numbers.issue_number(DocumentType::Invoice, 2025).await.unwrap();
    assert_eq!(n.to_string(), "2025-000001");
}

fn service(store: &MemoryStore, attempts: u32) -> DocumentService {
    let catalog = InMemoryCatalog::new().with_client("c1", ClientSnapshot::named("Malerbetrieb Roth"));
    let config = EngineConfigBuilder::new()
        .number_retry_limit(attempts)
        .retry_backoff_ms(1)
        .build();
    DocumentService::new(Arc::new(store.clone()), Catalogs::from_one(catalog), config)
}

fn input() -> NewDocument {
    NewDocumentBuilder::new("c1", NaiveDate::from_ymd_opt(2025, 6, 2).unwrap())
        .tax_keys(german_defaults())
        .add_line(LineItemBuilder::new(1, "Fassade streichen", dec!(120), "m²", dec!(18), "DE19").build())
        .build()
        .unwrap()
}

#[tokio::test]
async fn creation_retries_through_conflicts() {
    let store = MemoryStore::new();
    let service = service(&store, 4);
    store.fail_next_commits(3);
    let offer = service.create_offer(input()).await.unwrap();
    assert_eq!(offer.base().number().to_string(), "2025-0001");
    assert_eq!(store.document_count().await, 1);
}

#[tokio::test]
async fn exhausted_retries_persist_nothing() {
    let store = MemoryStore::new();
    let service = service(&store, 3);
    store.fail_next_commits(3);
    let err = service.create_invoice(input()).await.unwrap_err();
    assert!(matches!(err, EngineError::RetryExceeded { attempts: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(store.document_count().await, 0);

    // The counter rolled back with the document: the next number is still 1.
    let invoice = service.create_invoice(input()).await.unwrap();
    assert_eq!(invoice.base().number().seq(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_document_creation_never_duplicates() {
    let store = MemoryStore::new();
    let service = Arc::new(service(&store, 5));

    let handles: Vec<_> = (0..25)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.create_invoice(input()).await })
        })
        .collect();

    let mut numbers = HashSet::new();
    for handle in handles {
        let invoice = handle.await.unwrap().unwrap();
        assert!(numbers.insert(invoice.base().number()));
    }
    assert_eq!(numbers.len(), 25);
    assert_eq!(store.document_count().await, 25);
}
