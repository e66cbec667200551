use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use crate::catalog::{ClientCatalog, MaterialCatalog, PersonnelCatalog};
use crate::core::{
    ClientSnapshot, CounterKey, DocumentId, EngineConfig, EngineError, LineItem, NewDocument,
    Payment, PaymentMethod, TaxKey, Totals, compute_totals, validate_tax_keys,
};
use crate::costing::{CalcSummary, enrich_items, recalculate_summary};
use crate::store::{NumberGenerator, RetryPolicy, Store, UnitOfWork, retry_on_conflict};

use super::document::{
    Document, DocumentBase, DocumentContent, Invoice, Offer, Order, Prototype, TransitionContext,
};
use super::state::{DocumentState, InvoiceState, OfferState};

/// The external catalogs a [`DocumentService`] reads from.
#[derive(Clone)]
pub struct Catalogs {
    pub clients: Arc<dyn ClientCatalog>,
    pub materials: Arc<dyn MaterialCatalog>,
    pub personnel: Arc<dyn PersonnelCatalog>,
}

impl Catalogs {
    /// Use one backend for all three lookups.
    pub fn from_one<C>(catalog: C) -> Self
    where
        C: ClientCatalog + MaterialCatalog + PersonnelCatalog + 'static,
    {
        let catalog = Arc::new(catalog);
        Self {
            clients: catalog.clone(),
            materials: catalog.clone(),
            personnel: catalog,
        }
    }
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Creates, edits, converts and settles offers, orders and invoices.
///
/// Each write is one unit of work against the [`Store`]: number issue and
/// document insert, state and totals, payment row and open amount always
/// commit together. Conflicting units of work are retried with the
/// configured policy.
///
/// ```
/// use std::sync::Arc;
/// use chrono::NaiveDate;
/// use rust_decimal_macros::dec;
/// use werkbeleg::catalog::InMemoryCatalog;
/// use werkbeleg::core::*;
/// use werkbeleg::lifecycle::{Catalogs, DocumentService};
/// use werkbeleg::store::MemoryStore;
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let catalog = InMemoryCatalog::new().with_client("c1", ClientSnapshot::named("Huber GmbH"));
/// let service = DocumentService::new(
///     Arc::new(MemoryStore::new()),
///     Catalogs::from_one(catalog),
///     EngineConfig::default(),
/// );
/// let issue = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
/// let input = NewDocumentBuilder::new("c1", issue)
///     .tax_keys(german_defaults())
///     .add_line(LineItemBuilder::new(1, "Heizung warten", dec!(2), "Std", dec!(100), "DE19").build())
///     .build()
///     .unwrap();
/// let offer = service.create_offer(input).await.unwrap();
/// assert_eq!(offer.base().number().to_string(), "2025-0001");
/// assert_eq!(offer.base().totals().grand_total_gross, dec!(238));
/// # });
/// ```
pub struct DocumentService {
    store: Arc<dyn Store>,
    catalogs: Catalogs,
    numbers: NumberGenerator,
    config: EngineConfig,
    clock: Clock,
}

impl fmt::Debug for DocumentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentService")
            .field("numbers", &self.numbers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DocumentService {
    pub fn new(store: Arc<dyn Store>, catalogs: Catalogs, config: EngineConfig) -> Self {
        let numbers = NumberGenerator::new(store.clone(), &config);
        Self {
            store,
            catalogs,
            numbers,
            config,
            clock: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// Replace the date source used for conversions, payments, locking and
    /// overdue checks.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn numbers(&self) -> &NumberGenerator {
        &self.numbers
    }

    fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    fn policy(&self) -> RetryPolicy {
        self.numbers.policy()
    }

    fn transition_context(&self) -> TransitionContext {
        TransitionContext {
            today: self.today(),
            default_overhead_pct: self.config.default_overhead_pct,
        }
    }

    // ---------------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------------

    /// Create an offer in `draft`.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_offer(&self, input: NewDocument) -> Result<Offer, EngineError> {
        self.create(input, Prototype::Offer).await?.into_offer()
    }

    /// Create an order in `open` without a preceding offer.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_order(&self, input: NewDocument) -> Result<Order, EngineError> {
        let prototype = Prototype::Order {
            related_offer_id: None,
            calc_summary: None,
        };
        self.create(input, prototype).await?.into_order()
    }

    /// Create an invoice in `draft` without a preceding order.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_invoice(&self, input: NewDocument) -> Result<Invoice, EngineError> {
        let prototype = Prototype::Invoice {
            related_order_id: None,
        };
        self.create(input, prototype).await?.into_invoice()
    }

    async fn create(&self, input: NewDocument, prototype: Prototype) -> Result<Document, EngineError> {
        let errors = validate_tax_keys(&input.tax_keys);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        if input.due_date.is_some_and(|due| due < input.issue_date) {
            return Err(EngineError::invalid("due_date", "due date is before the issue date"));
        }
        let totals = compute_totals(&input.line_items, &input.tax_keys, input.additional_discount_abs)?;
        let client_snapshot = self.client_snapshot(&input.client_id).await?;

        let content = DocumentContent {
            client_id: input.client_id,
            client_snapshot,
            locale: input.locale,
            currency: input.currency,
            issue_date: input.issue_date,
            due_date: input.due_date,
            note_internal: input.note_internal,
            note_customer: input.note_customer,
            line_items: input.line_items,
            additional_discount_abs: input.additional_discount_abs,
            tax_keys: input.tax_keys,
            totals,
        };
        self.insert_new(content, prototype).await
    }

    /// Issue a number and insert the document in one unit of work.
    async fn insert_new(&self, content: DocumentContent, prototype: Prototype) -> Result<Document, EngineError> {
        let key = CounterKey::for_date(prototype.document_type(), content.issue_date);
        let (this, content, prototype) = (self, &content, &prototype);
        let document = retry_on_conflict(self.policy(), &key.id(), move || async move {
            let mut uow = this.store.begin().await?;
            let number = this.numbers.issue_in(uow.as_mut(), key).await?;
            let base = DocumentBase::new(DocumentId::generate(), number, content.clone());
            let document = prototype.clone().into_document(base);
            uow.insert(&document).await?;
            uow.commit().await?;
            Ok(document)
        })
        .await?;
        info!(
            id = %document.id(),
            number = %document.number(),
            document_type = %document.document_type(),
            gross = %document.totals().grand_total_gross,
            "document created"
        );
        Ok(document)
    }

    async fn client_snapshot(&self, client_id: &str) -> Result<ClientSnapshot, EngineError> {
        let lookup = self.catalogs.clients.get(client_id);
        match tokio::time::timeout(self.config.catalog_timeout(), lookup).await {
            Ok(Ok(Some(client))) => Ok(client),
            Ok(Ok(None)) => Err(EngineError::NotFound(format!("client '{client_id}'"))),
            Ok(Err(e)) => Err(EngineError::Unavailable(format!("client '{client_id}': {e}"))),
            Err(_) => Err(EngineError::Unavailable(format!(
                "client '{client_id}': no answer within {} ms",
                self.config.catalog_timeout_ms
            ))),
        }
    }

    // ---------------------------------------------------------------------
    // Conversion
    // ---------------------------------------------------------------------

    /// Create an order from an accepted offer.
    ///
    /// Items, totals and client snapshot are copied; the order's cost
    /// summary is the offer's locked one.
    #[instrument(skip(self))]
    pub async fn convert_offer_to_order(&self, offer_id: &DocumentId) -> Result<Order, EngineError> {
        let today = self.today();
        let offer = self.document(offer_id).await?.into_offer()?;
        if offer.state != OfferState::Accepted {
            return Err(EngineError::PreconditionFailed(format!(
                "offer {} is {}; only accepted offers become orders",
                offer.base.number(),
                offer.state.code()
            )));
        }
        let summary = match offer.calc_summary.clone() {
            Some(summary) => summary,
            None => CalcSummary::calculate(offer.base.line_items(), self.config.default_overhead_pct)?,
        }
        .lock(today);

        let content = DocumentContent::copied_from(&offer.base, today, None);
        let prototype = Prototype::Order {
            related_offer_id: Some(offer_id.clone()),
            calc_summary: Some(summary),
        };
        self.insert_new(content, prototype).await?.into_order()
    }

    /// Create an invoice from an order in any state.
    ///
    /// Totals are copied verbatim; the invoice opens with the full gross
    /// amount.
    #[instrument(skip(self))]
    pub async fn convert_order_to_invoice(
        &self,
        order_id: &DocumentId,
        due_date: Option<NaiveDate>,
    ) -> Result<Invoice, EngineError> {
        let today = self.today();
        if due_date.is_some_and(|due| due < today) {
            return Err(EngineError::invalid("due_date", "due date is before the issue date"));
        }
        let order = self.document(order_id).await?.into_order()?;
        let content = DocumentContent::copied_from(&order.base, today, due_date);
        let prototype = Prototype::Invoice {
            related_order_id: Some(order_id.clone()),
        };
        self.insert_new(content, prototype).await?.into_invoice()
    }

    // ---------------------------------------------------------------------
    // Editing and transitions
    // ---------------------------------------------------------------------

    /// Replace the line items (and optionally the document discount) of a
    /// document in its initial state.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn update_line_items(
        &self,
        id: &DocumentId,
        items: Vec<LineItem>,
        additional_discount_abs: Option<Decimal>,
    ) -> Result<Document, EngineError> {
        let items = &items;
        self.modify(id, move |doc| {
            doc.update_content(Some(items.clone()), None, additional_discount_abs)
        })
        .await
    }

    /// Replace the tax keys of a document in its initial state.
    #[instrument(skip(self, tax_keys))]
    pub async fn update_tax_keys(&self, id: &DocumentId, tax_keys: Vec<TaxKey>) -> Result<Document, EngineError> {
        let tax_keys = &tax_keys;
        self.modify(id, move |doc| doc.update_content(None, Some(tax_keys.clone()), None))
            .await
    }

    /// Move a document along its lifecycle.
    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn transition(&self, id: &DocumentId, target: DocumentState) -> Result<Document, EngineError> {
        let ctx = self.transition_context();
        let document = self
            .modify(id, move |doc| doc.apply_transition(target, ctx))
            .await?;
        info!(number = %document.number(), state = %document.state(), "document transitioned");
        Ok(document)
    }

    /// Load, change and write back one document in a unit of work.
    async fn modify<F>(&self, id: &DocumentId, change: F) -> Result<Document, EngineError>
    where
        F: Fn(&mut Document) -> Result<(), EngineError>,
    {
        let (this, change) = (self, &change);
        retry_on_conflict(self.policy(), id.as_str(), move || async move {
            let mut uow = this.store.begin().await?;
            let mut document = load(uow.as_mut(), id).await?;
            change(&mut document)?;
            uow.update(&document).await?;
            uow.commit().await?;
            Ok(document)
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Costing
    // ---------------------------------------------------------------------

    /// Refresh unit costs from the catalogs and recompute the cost summary
    /// of an offer or order.
    ///
    /// Enriched items are written back only while the document is still
    /// editable. A locked summary fails with `PreconditionFailed` before any
    /// catalog is asked.
    #[instrument(skip(self))]
    pub async fn recalculate_costing(
        &self,
        id: &DocumentId,
        overhead_pct: Option<Decimal>,
    ) -> Result<CalcSummary, EngineError> {
        let overhead_pct = overhead_pct.unwrap_or(self.config.default_overhead_pct);
        let this = self;
        let summary = retry_on_conflict(self.policy(), id.as_str(), move || async move {
            let before = this.document(id).await?;
            if let Document::Invoice(_) = before {
                return Err(EngineError::PreconditionFailed(
                    "invoices carry no cost summary".into(),
                ));
            }
            if let Some(CalcSummary::Locked(locked)) = before.calc_summary() {
                return Err(EngineError::PreconditionFailed(format!(
                    "cost basis of {} was locked on {}",
                    before.number(),
                    locked.snapshot_date()
                )));
            }

            let items = enrich_items(
                before.base().line_items(),
                this.catalogs.materials.as_ref(),
                this.catalogs.personnel.as_ref(),
                this.config.catalog_timeout(),
            )
            .await;
            let summary = recalculate_summary(before.calc_summary(), &items, overhead_pct)?;

            let mut uow = this.store.begin().await?;
            let mut document = load(uow.as_mut(), id).await?;
            if document != before {
                return Err(EngineError::Conflict(format!(
                    "{} changed while costing",
                    document.number()
                )));
            }
            if document.is_mutable() {
                document.update_content(Some(items), None, None)?;
            }
            document.replace_calc_summary(summary.clone())?;
            uow.update(&document).await?;
            uow.commit().await?;
            Ok(summary)
        })
        .await?;
        let figures = summary.figures();
        info!(
            cost = %figures.cost_total,
            sell = %figures.sell_total,
            margin_pct = %figures.margin_pct,
            "cost summary recalculated"
        );
        Ok(summary)
    }

    // ---------------------------------------------------------------------
    // Payments
    // ---------------------------------------------------------------------

    /// Book a payment dated today against an invoice.
    ///
    /// The payment row, the invoice's running total, open amount and state
    /// commit together. Reaching an open amount of zero or less marks the
    /// invoice `paid`.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        invoice_id: &DocumentId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<Invoice, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::invalid("amount", "payment amount must be positive"));
        }
        let today = self.today();
        let this = self;
        let invoice = retry_on_conflict(self.policy(), invoice_id.as_str(), move || async move {
            let mut uow = this.store.begin().await?;
            let mut invoice = load(uow.as_mut(), invoice_id).await?.into_invoice()?;
            let payment = Payment {
                id: DocumentId::generate(),
                invoice_id: invoice_id.clone(),
                amount,
                method,
                paid_at: today,
                note: None,
            };
            invoice.apply_payment(&payment)?;
            uow.append_payment(&payment).await?;
            let document = Document::Invoice(invoice);
            uow.update(&document).await?;
            uow.commit().await?;
            document.into_invoice()
        })
        .await?;
        info!(
            number = %invoice.base().number(),
            open = %invoice.open_amount(),
            state = invoice.state().code(),
            "payment recorded"
        );
        if invoice.open_amount() < Decimal::ZERO {
            warn!(number = %invoice.base().number(), open = %invoice.open_amount(), "invoice overpaid");
        }
        Ok(invoice)
    }

    /// Move every `sent` invoice that is unpaid past its due date to
    /// `overdue`. Returns the ids that moved.
    #[instrument(skip(self))]
    pub async fn refresh_overdue(&self, today: NaiveDate) -> Result<Vec<DocumentId>, EngineError> {
        let ctx = TransitionContext {
            today,
            ..self.transition_context()
        };
        let this = self;
        let moved = retry_on_conflict(self.policy(), "refresh-overdue", move || async move {
            let mut uow = this.store.begin().await?;
            let mut moved = Vec::new();
            for id in uow.invoices_in_state(InvoiceState::Sent).await? {
                let mut document = load(uow.as_mut(), &id).await?;
                let due = document.as_invoice().is_some_and(|inv| inv.is_overdue_on(today));
                if due {
                    document.apply_transition(DocumentState::Invoice(InvoiceState::Overdue), ctx)?;
                    uow.update(&document).await?;
                    moved.push(id);
                }
            }
            uow.commit().await?;
            Ok(moved)
        })
        .await?;
        if !moved.is_empty() {
            info!(count = moved.len(), "invoices marked overdue");
        }
        Ok(moved)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Load a document. Invoices are checked for state/amount integrity.
    pub async fn document(&self, id: &DocumentId) -> Result<Document, EngineError> {
        let mut uow = self.store.begin().await?;
        load(uow.as_mut(), id).await
    }

    /// Persisted totals, as last computed.
    pub async fn totals(&self, id: &DocumentId) -> Result<Totals, EngineError> {
        Ok(self.document(id).await?.totals().clone())
    }

    pub async fn calc_summary(&self, id: &DocumentId) -> Result<Option<CalcSummary>, EngineError> {
        Ok(self.document(id).await?.calc_summary().cloned())
    }

    /// Payments of an invoice in booking order.
    pub async fn payments(&self, invoice_id: &DocumentId) -> Result<Vec<Payment>, EngineError> {
        let mut uow = self.store.begin().await?;
        load(uow.as_mut(), invoice_id).await?.into_invoice()?;
        Ok(uow.payments(invoice_id).await?)
    }
}

async fn load(uow: &mut dyn UnitOfWork, id: &DocumentId) -> Result<Document, EngineError> {
    let document = uow
        .document(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("document {id}")))?;
    if let Document::Invoice(invoice) = &document {
        if let Err(e) = invoice.check_integrity() {
            error!(id = %id, error = %e, "invoice failed integrity check");
            return Err(e);
        }
    }
    Ok(document)
}
