use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::{EngineError, ValidationError};
use super::tax_keys::validate_tax_keys;
use super::types::*;

/// Upper bound on positions per document.
pub const MAX_LINE_ITEMS: usize = 10_000;

/// Input for creating an offer, order or invoice.
///
/// Number, client snapshot and totals are not part of the input: the
/// engine assigns them at creation.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub client_id: String,
    pub locale: Locale,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub note_internal: Option<String>,
    pub note_customer: Option<String>,
    pub line_items: Vec<LineItem>,
    pub additional_discount_abs: Decimal,
    pub tax_keys: Vec<TaxKey>,
}

/// Builder for [`NewDocument`].
///
/// ```
/// use werkbeleg::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let input = NewDocumentBuilder::new("client-7", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
///     .tax_keys(german_defaults())
///     .add_line(LineItemBuilder::new(1, "Wandfliesen verlegen", dec!(12), "m²", dec!(45), "DE19").build())
///     .additional_discount(dec!(20))
///     .build()
///     .unwrap();
/// assert_eq!(input.line_items.len(), 1);
/// ```
pub struct NewDocumentBuilder {
    client_id: String,
    locale: Locale,
    currency: String,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    note_internal: Option<String>,
    note_customer: Option<String>,
    line_items: Vec<LineItem>,
    additional_discount_abs: Decimal,
    tax_keys: Vec<TaxKey>,
}

impl NewDocumentBuilder {
    pub fn new(client_id: impl Into<String>, issue_date: NaiveDate) -> Self {
        Self {
            client_id: client_id.into(),
            locale: Locale::De,
            currency: "EUR".to_string(),
            issue_date,
            due_date: None,
            note_internal: None,
            note_customer: None,
            line_items: Vec::new(),
            additional_discount_abs: Decimal::ZERO,
            tax_keys: Vec::new(),
        }
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = code.into();
        self
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    pub fn note_internal(mut self, note: impl Into<String>) -> Self {
        self.note_internal = Some(note.into());
        self
    }

    pub fn note_customer(mut self, note: impl Into<String>) -> Self {
        self.note_customer = Some(note.into());
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.line_items.push(line);
        self
    }

    pub fn lines(mut self, lines: Vec<LineItem>) -> Self {
        self.line_items = lines;
        self
    }

    pub fn additional_discount(mut self, amount: Decimal) -> Self {
        self.additional_discount_abs = amount;
        self
    }

    pub fn tax_keys(mut self, keys: Vec<TaxKey>) -> Self {
        self.tax_keys = keys;
        self
    }

    /// Check the shape of the input. Amount checks happen when totals are
    /// computed.
    pub fn build(self) -> Result<NewDocument, EngineError> {
        let mut errors = Vec::new();
        if self.client_id.trim().is_empty() {
            errors.push(ValidationError::new("client_id", "client id must not be empty"));
        }
        if self.currency.len() != 3 {
            errors.push(ValidationError::new(
                "currency",
                "currency code must be 3 characters (ISO 4217)",
            ));
        }
        if self.line_items.len() > MAX_LINE_ITEMS {
            errors.push(ValidationError::new(
                "line_items",
                format!("a document cannot have more than {MAX_LINE_ITEMS} line items"),
            ));
        }
        if let Some(due) = self.due_date {
            if due < self.issue_date {
                errors.push(ValidationError::new(
                    "due_date",
                    "due date must not be before the issue date",
                ));
            }
        }
        errors.extend(validate_tax_keys(&self.tax_keys));
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }

        Ok(NewDocument {
            client_id: self.client_id,
            locale: self.locale,
            currency: self.currency,
            issue_date: self.issue_date,
            due_date: self.due_date,
            note_internal: self.note_internal,
            note_customer: self.note_customer,
            line_items: self.line_items,
            additional_discount_abs: self.additional_discount_abs,
            tax_keys: self.tax_keys,
        })
    }
}

/// Builder for LineItem.
pub struct LineItemBuilder {
    item: LineItem,
}

impl LineItemBuilder {
    pub fn new(
        position: u32,
        description: impl Into<String>,
        quantity: Decimal,
        unit: impl Into<String>,
        unit_price: Decimal,
        tax_key: impl Into<String>,
    ) -> Self {
        Self {
            item: LineItem {
                position,
                description: description.into(),
                quantity,
                unit: unit.into(),
                unit_price,
                tax_key: tax_key.into(),
                discount_pct: None,
                item_type: None,
                unit_cost: None,
                unit_sell: None,
                markup_pct: None,
                line_margin: None,
                notes: None,
                material_id: None,
                personnel_id: None,
            },
        }
    }

    pub fn discount_pct(mut self, pct: Decimal) -> Self {
        self.item.discount_pct = Some(pct);
        self
    }

    pub fn item_type(mut self, item_type: ItemType) -> Self {
        self.item.item_type = Some(item_type);
        self
    }

    pub fn unit_cost(mut self, cost: Decimal) -> Self {
        self.item.unit_cost = Some(cost);
        self
    }

    pub fn unit_sell(mut self, sell: Decimal) -> Self {
        self.item.unit_sell = Some(sell);
        self
    }

    /// Mark as material and link to the material catalog.
    pub fn material(mut self, material_id: impl Into<String>) -> Self {
        self.item.item_type = Some(ItemType::Material);
        self.item.material_id = Some(material_id.into());
        self
    }

    /// Mark as labor and link to the personnel catalog.
    pub fn labor(mut self, personnel_id: impl Into<String>) -> Self {
        self.item.item_type = Some(ItemType::Labor);
        self.item.personnel_id = Some(personnel_id.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.item.notes = Some(notes.into());
        self
    }

    pub fn build(self) -> LineItem {
        self.item
    }
}
