//! Offer → order → invoice flow through the document service.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use werkbeleg::catalog::InMemoryCatalog;
use werkbeleg::core::*;
use werkbeleg::costing::CalcSummary;
use werkbeleg::lifecycle::*;
use werkbeleg::store::MemoryStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_client("k-100", ClientSnapshot::named("Bäckerei Hofmann"))
        .with_material("fliese-30x60", dec!(12))
        .with_personnel("meister-1", dec!(48))
}

fn service_on(store: &MemoryStore, catalog: InMemoryCatalog, today: NaiveDate) -> DocumentService {
    let config = EngineConfigBuilder::new().default_overhead_pct(dec!(10)).build();
    DocumentService::new(Arc::new(store.clone()), Catalogs::from_one(catalog), config)
        .with_clock(move || today)
}

fn service(today: NaiveDate) -> DocumentService {
    service_on(&MemoryStore::new(), catalog(), today)
}

fn offer_input() -> NewDocument {
    NewDocumentBuilder::new("k-100", date(2025, 6, 2))
        .tax_keys(german_defaults())
        .add_line(
            LineItemBuilder::new(1, "Fliesen 30x60", dec!(10), "m²", dec!(20), "DE19")
                .item_type(ItemType::Material)
                .unit_cost(dec!(15))
                .build(),
        )
        .add_line(
            LineItemBuilder::new(2, "Verlegen", dec!(5), "Std", dec!(30), "DE19")
                .item_type(ItemType::Labor)
                .unit_cost(dec!(20))
                .build(),
        )
        .note_customer("Angebot gültig 30 Tage")
        .build()
        .unwrap()
}

fn offer_state(s: OfferState) -> DocumentState {
    DocumentState::Offer(s)
}

fn invoice_state(s: InvoiceState) -> DocumentState {
    DocumentState::Invoice(s)
}

// --- Creation ---

#[tokio::test]
async fn new_offer_is_a_numbered_draft_with_totals() {
    let service = service(date(2025, 6, 2));
    let offer = service.create_offer(offer_input()).await.unwrap();

    assert_eq!(offer.state(), OfferState::Draft);
    assert_eq!(offer.base().number().to_string(), "2025-0001");
    assert_eq!(offer.base().client_snapshot().name, "Bäckerei Hofmann");
    assert_eq!(offer.base().totals().item_net_after_discount, dec!(350));
    assert_eq!(offer.base().totals().vat_by_key["DE19"], dec!(66.50));
    assert_eq!(offer.base().totals().grand_total_gross, dec!(416.50));
    assert!(offer.calc_summary().is_none());

    let stored = service.document(offer.base().id()).await.unwrap();
    assert_eq!(stored.as_offer(), Some(&offer));
}

#[tokio::test]
async fn unknown_client_is_not_found() {
    let service = service(date(2025, 6, 2));
    let input = NewDocumentBuilder::new("k-999", date(2025, 6, 2))
        .tax_keys(german_defaults())
        .build()
        .unwrap();
    let err = service.create_offer(input).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn offline_client_catalog_is_unavailable() {
    let store = MemoryStore::new();
    let service = service_on(&store, catalog().offline(), date(2025, 6, 2));
    let err = service.create_offer(offer_input()).await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(store.document_count().await, 0);
}

#[tokio::test]
async fn invalid_lines_create_nothing() {
    let store = MemoryStore::new();
    let service = service_on(&store, catalog(), date(2025, 6, 2));
    let input = NewDocumentBuilder::new("k-100", date(2025, 6, 2))
        .tax_keys(german_defaults())
        .add_line(LineItemBuilder::new(1, "Fehler", dec!(1), "Stk", dec!(10), "XX99").build())
        .build()
        .unwrap();
    let err = service.create_invoice(input).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(store.document_count().await, 0);
}

#[tokio::test]
async fn offers_orders_and_invoices_count_separately() {
    let service = service(date(2025, 6, 2));
    let offer = service.create_offer(offer_input()).await.unwrap();
    let order = service.create_order(offer_input()).await.unwrap();
    let invoice = service.create_invoice(offer_input()).await.unwrap();
    let second = service.create_invoice(offer_input()).await.unwrap();

    assert_eq!(offer.base().number().to_string(), "2025-0001");
    assert_eq!(order.base().number().to_string(), "2025-0001");
    assert_eq!(invoice.base().number().to_string(), "2025-0001");
    assert_eq!(second.base().number().to_string(), "2025-0002");
    assert_eq!(order.state(), OrderState::Open);
    assert_eq!(invoice.open_amount(), dec!(416.50));
}

// --- Editing ---

#[tokio::test]
async fn drafts_can_be_edited_until_sent() {
    let service = service(date(2025, 6, 2));
    let offer = service.create_offer(offer_input()).await.unwrap();
    let id = offer.base().id().clone();

    let lines = vec![LineItemBuilder::new(1, "Pauschale", dec!(1), "psch", dec!(100), "DE19").build()];
    let updated = service.update_line_items(&id, lines.clone(), Some(dec!(10))).await.unwrap();
    assert_eq!(updated.totals().item_net_after_discount, dec!(100));
    assert_eq!(updated.totals().grand_total_gross, dec!(107.10));

    service.transition(&id, offer_state(OfferState::Sent)).await.unwrap();

    let err = service.update_line_items(&id, lines, None).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
    let err = service.update_tax_keys(&id, german_defaults()).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));

    let totals = service.totals(&id).await.unwrap();
    assert_eq!(totals.grand_total_gross, dec!(107.10));
}

#[tokio::test]
async fn removing_a_used_tax_key_is_rejected() {
    let service = service(date(2025, 6, 2));
    let offer = service.create_offer(offer_input()).await.unwrap();
    let id = offer.base().id().clone();

    let only_reduced: Vec<_> = german_defaults().into_iter().filter(|k| k.key == "DE7").collect();
    let err = service.update_tax_keys(&id, only_reduced).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let unchanged = service.document(&id).await.unwrap();
    assert_eq!(unchanged.base().tax_keys().len(), german_defaults().len());
    assert_eq!(unchanged.totals(), offer.base().totals());
}

// --- Transitions ---

#[tokio::test]
async fn illegal_transitions_are_refused() {
    let service = service(date(2025, 6, 2));
    let offer = service.create_offer(offer_input()).await.unwrap();
    let id = offer.base().id().clone();

    let err = service.transition(&id, offer_state(OfferState::Accepted)).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
    let err = service.transition(&id, invoice_state(InvoiceState::Sent)).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));

    let missing = DocumentId::generate();
    let err = service.transition(&missing, offer_state(OfferState::Sent)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn accepting_an_offer_locks_its_cost_basis() {
    let today = date(2025, 6, 5);
    let service = service(today);
    let offer = service.create_offer(offer_input()).await.unwrap();
    let id = offer.base().id().clone();

    service.transition(&id, offer_state(OfferState::Sent)).await.unwrap();
    let accepted = service.transition(&id, offer_state(OfferState::Accepted)).await.unwrap();

    let summary = accepted.calc_summary().unwrap();
    assert!(summary.snapshot_locked());
    assert_eq!(summary.snapshot_date(), Some(today));
    // 150 materials + 100 labor, 10 % overhead
    assert_eq!(summary.figures().materials_cost, dec!(150));
    assert_eq!(summary.figures().labor_cost, dec!(100));
    assert_eq!(summary.figures().cost_total, dec!(275));
    assert_eq!(summary.figures().margin_value, dec!(75));

    let err = service.recalculate_costing(&id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
    assert_eq!(service.calc_summary(&id).await.unwrap().as_ref(), Some(summary));
}

#[tokio::test]
async fn accepted_offer_becomes_order_with_locked_summary() {
    let today = date(2025, 6, 9);
    let service = service(today);
    let offer = service.create_offer(offer_input()).await.unwrap();
    let offer_id = offer.base().id().clone();

    let err = service.convert_offer_to_order(&offer_id).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));

    service.transition(&offer_id, offer_state(OfferState::Sent)).await.unwrap();
    service.transition(&offer_id, offer_state(OfferState::Accepted)).await.unwrap();

    let order = service.convert_offer_to_order(&offer_id).await.unwrap();
    assert_eq!(order.state(), OrderState::Open);
    assert_eq!(order.related_offer_id(), Some(&offer_id));
    assert_eq!(order.base().issue_date(), today);
    assert_eq!(order.base().totals(), offer.base().totals());
    assert_eq!(order.base().line_items(), offer.base().line_items());
    assert_eq!(order.base().note_customer(), Some("Angebot gültig 30 Tage"));

    let summary = order.calc_summary().unwrap();
    assert!(summary.snapshot_locked());
    assert_eq!(summary.figures().cost_total, dec!(275));

    let err = service.recalculate_costing(order.base().id(), Some(dec!(20))).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
}

#[tokio::test]
async fn order_becomes_invoice_with_copied_totals() {
    let today = date(2025, 6, 20);
    let service = service(today);
    let order = service.create_order(offer_input()).await.unwrap();
    let order_id = order.base().id().clone();
    service
        .transition(&order_id, DocumentState::Order(OrderState::InProgress))
        .await
        .unwrap();

    let err = service
        .convert_order_to_invoice(&order_id, Some(date(2025, 6, 19)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let invoice = service
        .convert_order_to_invoice(&order_id, Some(date(2025, 7, 4)))
        .await
        .unwrap();
    assert_eq!(invoice.state(), InvoiceState::Draft);
    assert_eq!(invoice.related_order_id(), Some(&order_id));
    assert_eq!(invoice.base().issue_date(), today);
    assert_eq!(invoice.base().due_date(), Some(date(2025, 7, 4)));
    assert_eq!(invoice.base().totals(), order.base().totals());
    assert_eq!(invoice.open_amount(), dec!(416.50));
    assert_eq!(invoice.payments_total(), Decimal::ZERO);

    // Only orders convert to invoices.
    let err = service.convert_order_to_invoice(invoice.base().id(), None).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
}

// --- Costing ---

#[tokio::test]
async fn costing_a_draft_offer_refreshes_catalog_prices() {
    let service = service(date(2025, 6, 2));
    let input = NewDocumentBuilder::new("k-100", date(2025, 6, 2))
        .tax_keys(german_defaults())
        .add_line(
            LineItemBuilder::new(1, "Fliesen 30x60", dec!(10), "m²", dec!(20), "DE19")
                .material("fliese-30x60")
                .unit_cost(dec!(9))
                .build(),
        )
        .add_line(
            LineItemBuilder::new(2, "Verlegen", dec!(5), "Std", dec!(70), "DE19")
                .labor("meister-1")
                .build(),
        )
        .build()
        .unwrap();
    let offer = service.create_offer(input).await.unwrap();
    let id = offer.base().id().clone();

    let summary = service.recalculate_costing(&id, Some(dec!(0))).await.unwrap();
    assert!(matches!(summary, CalcSummary::Draft(_)));
    assert_eq!(summary.figures().materials_cost, dec!(120));
    assert_eq!(summary.figures().labor_cost, dec!(240));
    assert_eq!(summary.figures().sell_total, dec!(550));
    assert_eq!(summary.figures().margin_value, dec!(190));

    let stored = service.document(&id).await.unwrap();
    assert_eq!(stored.base().line_items()[0].unit_cost, Some(dec!(12)));
    assert_eq!(stored.base().line_items()[1].unit_cost, Some(dec!(48)));
    assert_eq!(stored.calc_summary(), Some(&summary));
    // Cost data never moves the customer-facing totals.
    assert_eq!(stored.totals(), offer.base().totals());
}

#[tokio::test]
async fn editing_items_discards_a_stale_draft_summary() {
    let service = service(date(2025, 6, 5));
    let offer = service.create_offer(offer_input()).await.unwrap();
    let id = offer.base().id().clone();

    let draft = service.recalculate_costing(&id, None).await.unwrap();
    assert_eq!(draft.figures().cost_total, dec!(275));

    let lines = vec![
        LineItemBuilder::new(1, "Naturstein", dec!(1), "psch", dec!(500), "DE19")
            .item_type(ItemType::Material)
            .unit_cost(dec!(400))
            .build(),
    ];
    service.update_line_items(&id, lines, None).await.unwrap();
    assert_eq!(service.calc_summary(&id).await.unwrap(), None);

    service.transition(&id, offer_state(OfferState::Sent)).await.unwrap();
    let accepted = service.transition(&id, offer_state(OfferState::Accepted)).await.unwrap();

    // The locked basis describes the current items: 400 + 10 % overhead.
    let locked = accepted.calc_summary().unwrap();
    assert!(locked.snapshot_locked());
    assert_eq!(locked.figures().materials_cost, dec!(400));
    assert_eq!(locked.figures().cost_total, dec!(440));
    assert_eq!(locked.figures().sell_total, dec!(500));
}

#[tokio::test]
async fn invoices_have_no_cost_summary() {
    let service = service(date(2025, 6, 2));
    let invoice = service.create_invoice(offer_input()).await.unwrap();
    let err = service.recalculate_costing(invoice.base().id(), None).await.unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
    assert_eq!(service.calc_summary(invoice.base().id()).await.unwrap(), None);
}

// --- Overdue ---

#[tokio::test]
async fn sent_invoices_past_due_become_overdue() {
    let store = MemoryStore::new();
    let service = service_on(&store, catalog(), date(2025, 6, 2));
    let input = || {
        NewDocumentBuilder::new("k-100", date(2025, 6, 2))
            .due_date(date(2025, 6, 30))
            .tax_keys(german_defaults())
            .add_line(LineItemBuilder::new(1, "Wartung", dec!(1), "psch", dec!(200), "DE19").build())
            .build()
            .unwrap()
    };
    let sent = service.create_invoice(input()).await.unwrap();
    let draft = service.create_invoice(input()).await.unwrap();
    service
        .transition(sent.base().id(), invoice_state(InvoiceState::Sent))
        .await
        .unwrap();

    // Not before the due date has passed.
    let err = service
        .transition(sent.base().id(), invoice_state(InvoiceState::Overdue))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PreconditionFailed(_)));
    assert!(service.refresh_overdue(date(2025, 6, 30)).await.unwrap().is_empty());

    let moved = service.refresh_overdue(date(2025, 7, 1)).await.unwrap();
    assert_eq!(moved, vec![sent.base().id().clone()]);
    assert_eq!(
        service.document(sent.base().id()).await.unwrap().state(),
        invoice_state(InvoiceState::Overdue)
    );
    assert_eq!(
        service.document(draft.base().id()).await.unwrap().state(),
        invoice_state(InvoiceState::Draft)
    );

    // A second run finds nothing left to move.
    assert!(service.refresh_overdue(date(2025, 7, 2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn invoice_without_due_date_never_goes_overdue() {
    let service = service(date(2025, 6, 2));
    let invoice = service.create_invoice(offer_input()).await.unwrap();
    service
        .transition(invoice.base().id(), invoice_state(InvoiceState::Sent))
        .await
        .unwrap();
    assert!(service.refresh_overdue(date(2030, 1, 1)).await.unwrap().is_empty());
}
