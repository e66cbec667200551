use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{
    ClientSnapshot, DocumentId, DocumentNumber, DocumentType, EngineError, LineItem, Locale,
    MAX_LINE_ITEMS, Payment, TaxKey, Totals, compute_totals, validate_tax_keys,
};
use crate::costing::CalcSummary;

use super::state::{DocumentState, InvoiceState, OfferState, OrderState};

/// Fields shared by offers, orders and invoices.
///
/// `number` and `client_snapshot` are assigned once at creation and have no
/// setters. Items, tax keys and discount change only through
/// [`Document::update_content`], which refuses documents that left their
/// initial state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBase {
    id: DocumentId,
    number: DocumentNumber,
    client_id: String,
    client_snapshot: ClientSnapshot,
    locale: Locale,
    currency: String,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    note_internal: Option<String>,
    note_customer: Option<String>,
    line_items: Vec<LineItem>,
    additional_discount_abs: Decimal,
    tax_keys: Vec<TaxKey>,
    totals: Totals,
}

/// Everything a new document carries except its id and number.
#[derive(Debug, Clone)]
pub(crate) struct DocumentContent {
    pub client_id: String,
    pub client_snapshot: ClientSnapshot,
    pub locale: Locale,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub note_internal: Option<String>,
    pub note_customer: Option<String>,
    pub line_items: Vec<LineItem>,
    pub additional_discount_abs: Decimal,
    pub tax_keys: Vec<TaxKey>,
    pub totals: Totals,
}

impl DocumentContent {
    /// Content copied from an existing document, e.g. offer → order.
    pub fn copied_from(base: &DocumentBase, issue_date: NaiveDate, due_date: Option<NaiveDate>) -> Self {
        Self {
            client_id: base.client_id.clone(),
            client_snapshot: base.client_snapshot.clone(),
            locale: base.locale,
            currency: base.currency.clone(),
            issue_date,
            due_date,
            note_internal: base.note_internal.clone(),
            note_customer: base.note_customer.clone(),
            line_items: base.line_items.clone(),
            additional_discount_abs: base.additional_discount_abs,
            tax_keys: base.tax_keys.clone(),
            totals: base.totals.clone(),
        }
    }
}

impl DocumentBase {
    pub(crate) fn new(id: DocumentId, number: DocumentNumber, content: DocumentContent) -> Self {
        Self {
            id,
            number,
            client_id: content.client_id,
            client_snapshot: content.client_snapshot,
            locale: content.locale,
            currency: content.currency,
            issue_date: content.issue_date,
            due_date: content.due_date,
            note_internal: content.note_internal,
            note_customer: content.note_customer,
            line_items: content.line_items,
            additional_discount_abs: content.additional_discount_abs,
            tax_keys: content.tax_keys,
            totals: content.totals,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn number(&self) -> DocumentNumber {
        self.number
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_snapshot(&self) -> &ClientSnapshot {
        &self.client_snapshot
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn note_internal(&self) -> Option<&str> {
        self.note_internal.as_deref()
    }

    pub fn note_customer(&self) -> Option<&str> {
        self.note_customer.as_deref()
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn additional_discount_abs(&self) -> Decimal {
        self.additional_discount_abs
    }

    pub fn tax_keys(&self) -> &[TaxKey] {
        &self.tax_keys
    }

    /// Persisted totals of the last computation.
    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    fn recompute_totals(&mut self) -> Result<(), EngineError> {
        self.totals = compute_totals(&self.line_items, &self.tax_keys, self.additional_discount_abs)?;
        Ok(())
    }
}

/// Angebot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub(crate) base: DocumentBase,
    pub(crate) state: OfferState,
    pub(crate) calc_summary: Option<CalcSummary>,
}

/// Auftrag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub(crate) base: DocumentBase,
    pub(crate) state: OrderState,
    pub(crate) related_offer_id: Option<DocumentId>,
    pub(crate) calc_summary: Option<CalcSummary>,
}

/// Rechnung. `payments_total` and `open_amount` are written together with
/// `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub(crate) base: DocumentBase,
    pub(crate) state: InvoiceState,
    pub(crate) related_order_id: Option<DocumentId>,
    pub(crate) payments_total: Decimal,
    pub(crate) open_amount: Decimal,
}

impl Offer {
    pub fn base(&self) -> &DocumentBase {
        &self.base
    }

    pub fn state(&self) -> OfferState {
        self.state
    }

    pub fn calc_summary(&self) -> Option<&CalcSummary> {
        self.calc_summary.as_ref()
    }
}

impl Order {
    pub fn base(&self) -> &DocumentBase {
        &self.base
    }

    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn related_offer_id(&self) -> Option<&DocumentId> {
        self.related_offer_id.as_ref()
    }

    pub fn calc_summary(&self) -> Option<&CalcSummary> {
        self.calc_summary.as_ref()
    }
}

impl Invoice {
    pub fn base(&self) -> &DocumentBase {
        &self.base
    }

    pub fn state(&self) -> InvoiceState {
        self.state
    }

    pub fn related_order_id(&self) -> Option<&DocumentId> {
        self.related_order_id.as_ref()
    }

    pub fn payments_total(&self) -> Decimal {
        self.payments_total
    }

    /// `grand_total_gross − Σ payments`. Negative on overpayment.
    pub fn open_amount(&self) -> Decimal {
        self.open_amount
    }

    /// Unpaid past its due date and still in `sent`.
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.state == InvoiceState::Sent
            && self.open_amount > Decimal::ZERO
            && self.base.due_date.is_some_and(|due| due < today)
    }

    /// Book a payment: update the running total, open amount and state in
    /// one step.
    pub(crate) fn apply_payment(&mut self, payment: &Payment) -> Result<(), EngineError> {
        if payment.amount <= Decimal::ZERO {
            return Err(EngineError::invalid("amount", "payment amount must be positive"));
        }
        if !self.state.accepts_payments() {
            return Err(EngineError::PreconditionFailed(format!(
                "invoice {} is {} and does not accept payments",
                self.base.number,
                self.state.code()
            )));
        }
        self.payments_total += payment.amount;
        self.open_amount = self.base.totals.grand_total_gross - self.payments_total;
        if self.open_amount <= Decimal::ZERO {
            self.state = InvoiceState::Paid;
        }
        Ok(())
    }

    /// State and open amount must agree.
    pub fn check_integrity(&self) -> Result<(), EngineError> {
        let expected_open = self.base.totals.grand_total_gross - self.payments_total;
        if self.open_amount != expected_open {
            return Err(EngineError::IntegrityViolation(format!(
                "invoice {} open amount {} does not match gross {} - payments {}",
                self.base.number,
                self.open_amount,
                self.base.totals.grand_total_gross,
                self.payments_total
            )));
        }
        let contradicts = match self.state {
            InvoiceState::Paid => self.open_amount > Decimal::ZERO,
            InvoiceState::Sent | InvoiceState::Overdue => {
                self.payments_total > Decimal::ZERO && self.open_amount <= Decimal::ZERO
            }
            InvoiceState::Draft => false,
        };
        if contradicts {
            return Err(EngineError::IntegrityViolation(format!(
                "invoice {} is {} with open amount {}",
                self.base.number,
                self.state.code(),
                self.open_amount
            )));
        }
        Ok(())
    }
}

/// An offer, order or invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document_type", rename_all = "lowercase")]
pub enum Document {
    Offer(Offer),
    Order(Order),
    Invoice(Invoice),
}

/// Inputs that decide which kind of document a creation produces.
#[derive(Debug, Clone)]
pub(crate) enum Prototype {
    Offer,
    Order {
        related_offer_id: Option<DocumentId>,
        calc_summary: Option<CalcSummary>,
    },
    Invoice {
        related_order_id: Option<DocumentId>,
    },
}

impl Prototype {
    pub fn document_type(&self) -> DocumentType {
        match self {
            Self::Offer => DocumentType::Offer,
            Self::Order { .. } => DocumentType::Order,
            Self::Invoice { .. } => DocumentType::Invoice,
        }
    }

    pub fn into_document(self, base: DocumentBase) -> Document {
        match self {
            Self::Offer => Document::Offer(Offer {
                base,
                state: OfferState::Draft,
                calc_summary: None,
            }),
            Self::Order {
                related_offer_id,
                calc_summary,
            } => Document::Order(Order {
                base,
                state: OrderState::Open,
                related_offer_id,
                calc_summary,
            }),
            Self::Invoice { related_order_id } => {
                let open_amount = base.totals.grand_total_gross;
                Document::Invoice(Invoice {
                    base,
                    state: InvoiceState::Draft,
                    related_order_id,
                    payments_total: Decimal::ZERO,
                    open_amount,
                })
            }
        }
    }
}

/// What a transition needs besides the target state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransitionContext {
    pub today: NaiveDate,
    pub default_overhead_pct: Decimal,
}

impl Document {
    pub fn base(&self) -> &DocumentBase {
        match self {
            Self::Offer(d) => &d.base,
            Self::Order(d) => &d.base,
            Self::Invoice(d) => &d.base,
        }
    }

    fn base_mut(&mut self) -> &mut DocumentBase {
        match self {
            Self::Offer(d) => &mut d.base,
            Self::Order(d) => &mut d.base,
            Self::Invoice(d) => &mut d.base,
        }
    }

    pub fn id(&self) -> &DocumentId {
        self.base().id()
    }

    pub fn number(&self) -> DocumentNumber {
        self.base().number()
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            Self::Offer(_) => DocumentType::Offer,
            Self::Order(_) => DocumentType::Order,
            Self::Invoice(_) => DocumentType::Invoice,
        }
    }

    pub fn state(&self) -> DocumentState {
        match self {
            Self::Offer(d) => DocumentState::Offer(d.state),
            Self::Order(d) => DocumentState::Order(d.state),
            Self::Invoice(d) => DocumentState::Invoice(d.state),
        }
    }

    pub fn is_mutable(&self) -> bool {
        self.state().is_mutable()
    }

    pub fn totals(&self) -> &Totals {
        self.base().totals()
    }

    pub fn calc_summary(&self) -> Option<&CalcSummary> {
        match self {
            Self::Offer(d) => d.calc_summary.as_ref(),
            Self::Order(d) => d.calc_summary.as_ref(),
            Self::Invoice(_) => None,
        }
    }

    pub fn as_offer(&self) -> Option<&Offer> {
        match self {
            Self::Offer(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_order(&self) -> Option<&Order> {
        match self {
            Self::Order(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_invoice(&self) -> Option<&Invoice> {
        match self {
            Self::Invoice(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_offer(self) -> Result<Offer, EngineError> {
        match self {
            Self::Offer(d) => Ok(d),
            other => Err(other.wrong_type(DocumentType::Offer)),
        }
    }

    pub fn into_order(self) -> Result<Order, EngineError> {
        match self {
            Self::Order(d) => Ok(d),
            other => Err(other.wrong_type(DocumentType::Order)),
        }
    }

    pub fn into_invoice(self) -> Result<Invoice, EngineError> {
        match self {
            Self::Invoice(d) => Ok(d),
            other => Err(other.wrong_type(DocumentType::Invoice)),
        }
    }

    fn wrong_type(&self, expected: DocumentType) -> EngineError {
        EngineError::PreconditionFailed(format!(
            "document {} is an {}, expected an {expected}",
            self.id(),
            self.document_type()
        ))
    }

    /// Replace items, tax keys and/or discount and recompute totals.
    ///
    /// New line items discard a draft cost summary, which described the old
    /// ones; a locked summary stays. All-or-nothing: on any error the
    /// document is unchanged.
    pub(crate) fn update_content(
        &mut self,
        line_items: Option<Vec<LineItem>>,
        tax_keys: Option<Vec<TaxKey>>,
        additional_discount_abs: Option<Decimal>,
    ) -> Result<(), EngineError> {
        if !self.is_mutable() {
            return Err(EngineError::PreconditionFailed(format!(
                "{} {} is {} and can no longer be edited",
                self.document_type(),
                self.number(),
                self.state().code()
            )));
        }
        if line_items.as_ref().is_some_and(|items| items.len() > MAX_LINE_ITEMS) {
            return Err(EngineError::invalid(
                "line_items",
                format!("at most {MAX_LINE_ITEMS} positions per document"),
            ));
        }
        if let Some(keys) = &tax_keys {
            let errors = validate_tax_keys(keys);
            if !errors.is_empty() {
                return Err(EngineError::Validation(errors));
            }
        }

        let items_replaced = line_items.is_some();
        let base = self.base();
        let items = line_items.unwrap_or_else(|| base.line_items.clone());
        let keys = tax_keys.unwrap_or_else(|| base.tax_keys.clone());
        let discount = additional_discount_abs.unwrap_or(base.additional_discount_abs);
        let totals = compute_totals(&items, &keys, discount)?;

        let base = self.base_mut();
        base.line_items = items;
        base.tax_keys = keys;
        base.additional_discount_abs = discount;
        base.totals = totals;

        match self {
            Self::Invoice(inv) => {
                inv.open_amount = inv.base.totals.grand_total_gross - inv.payments_total;
            }
            Self::Offer(Offer { calc_summary, .. }) | Self::Order(Order { calc_summary, .. }) => {
                if items_replaced && calc_summary.as_ref().is_some_and(|s| !s.snapshot_locked()) {
                    *calc_summary = None;
                }
            }
        }
        Ok(())
    }

    /// Replace the costing summary, refusing a locked one.
    pub(crate) fn replace_calc_summary(&mut self, summary: CalcSummary) -> Result<(), EngineError> {
        let slot = match self {
            Self::Offer(d) => &mut d.calc_summary,
            Self::Order(d) => &mut d.calc_summary,
            Self::Invoice(_) => {
                return Err(EngineError::PreconditionFailed(
                    "invoices carry no cost summary".into(),
                ));
            }
        };
        if let Some(current) = slot {
            if current.snapshot_locked() {
                return Err(EngineError::PreconditionFailed(
                    "cost basis is locked and cannot be recomputed".into(),
                ));
            }
        }
        *slot = Some(summary);
        Ok(())
    }

    /// Move to `target`, enforcing the lifecycle edges and guards.
    ///
    /// Totals are recomputed when leaving the initial state and frozen
    /// afterwards. Accepting an offer locks its cost basis. Sending an
    /// invoice with nothing open lands it in `paid`.
    pub(crate) fn apply_transition(
        &mut self,
        target: DocumentState,
        ctx: TransitionContext,
    ) -> Result<(), EngineError> {
        let current = self.state();
        if !current.can_move_to(target) {
            return Err(EngineError::PreconditionFailed(format!(
                "cannot move {} from {} to {}",
                self.document_type(),
                current.code(),
                target.code()
            )));
        }

        if current.is_mutable() {
            self.base_mut().recompute_totals()?;
            if let Self::Invoice(inv) = self {
                inv.open_amount = inv.base.totals.grand_total_gross - inv.payments_total;
            }
        }

        match (self, target) {
            (Self::Offer(offer), DocumentState::Offer(to)) => {
                if to == OfferState::Accepted {
                    let summary = match offer.calc_summary.take() {
                        Some(summary) => summary,
                        None => CalcSummary::calculate(&offer.base.line_items, ctx.default_overhead_pct)?,
                    };
                    offer.calc_summary = Some(summary.lock(ctx.today));
                }
                offer.state = to;
            }
            (Self::Order(order), DocumentState::Order(to)) => order.state = to,
            (Self::Invoice(inv), DocumentState::Invoice(to)) => {
                match to {
                    InvoiceState::Overdue if !inv.is_overdue_on(ctx.today) => {
                        return Err(EngineError::PreconditionFailed(format!(
                            "invoice {} is not overdue on {}",
                            inv.base.number, ctx.today
                        )));
                    }
                    InvoiceState::Paid if inv.open_amount > Decimal::ZERO => {
                        return Err(EngineError::PreconditionFailed(format!(
                            "invoice {} still has {} open",
                            inv.base.number, inv.open_amount
                        )));
                    }
                    _ => {}
                }
                // Nothing left to pay: sending settles the invoice at once.
                inv.state = if to == InvoiceState::Sent && inv.open_amount <= Decimal::ZERO {
                    InvoiceState::Paid
                } else {
                    to
                };
            }
            (_, to) => {
                return Err(EngineError::PreconditionFailed(format!(
                    "{to} does not belong to this document"
                )));
            }
        }
        Ok(())
    }
}
