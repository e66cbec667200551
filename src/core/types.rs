use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque document identifier, assigned once at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three document kinds the engine issues numbers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Angebot.
    Offer,
    /// Auftrag.
    Order,
    /// Rechnung.
    Invoice,
}

impl DocumentType {
    /// Lower-case code used in counter keys and storage.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Order => "order",
            Self::Invoice => "invoice",
        }
    }

    /// Parse from the lower-case code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "offer" => Some(Self::Offer),
            "order" => Some(Self::Order),
            "invoice" => Some(Self::Invoice),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Document language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    De,
    En,
}

/// Tax key: VAT rate plus bilingual description, per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxKey {
    /// Short code, e.g. "DE19".
    pub key: String,
    /// Rate in percent (19 = 19%).
    pub rate_pct: Decimal,
    pub description_de: String,
    pub description_en: String,
}

impl TaxKey {
    pub fn new(
        key: impl Into<String>,
        rate_pct: Decimal,
        description_de: impl Into<String>,
        description_en: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            rate_pct,
            description_de: description_de.into(),
            description_en: description_en.into(),
        }
    }

    /// Description in the document's language.
    pub fn description(&self, locale: Locale) -> &str {
        match locale {
            Locale::De => &self.description_de,
            Locale::En => &self.description_en,
        }
    }
}

/// Costing category of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Material,
    Labor,
    Service,
}

/// A single position on an offer, order or invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// 1-based position on the document.
    pub position: u32,
    pub description: String,
    pub quantity: Decimal,
    /// Unit label, e.g. "Stk", "Std", "m²".
    pub unit: String,
    /// Net price per unit.
    pub unit_price: Decimal,
    /// References a [`TaxKey::key`] of the owning document.
    pub tax_key: String,
    /// Line discount in percent.
    pub discount_pct: Option<Decimal>,
    /// Costing category; `None` is treated as a mixed material/labor service.
    #[serde(rename = "type")]
    pub item_type: Option<ItemType>,
    /// Cost per unit before markup.
    pub unit_cost: Option<Decimal>,
    /// Selling price per unit if different from `unit_price`.
    pub unit_sell: Option<Decimal>,
    /// Derived by cost enrichment.
    pub markup_pct: Option<Decimal>,
    /// Derived by cost enrichment: sell total minus cost total.
    pub line_margin: Option<Decimal>,
    /// Internal costing note.
    pub notes: Option<String>,
    /// Material catalog reference for `ItemType::Material`.
    pub material_id: Option<String>,
    /// Personnel catalog reference for `ItemType::Labor`.
    pub personnel_id: Option<String>,
}

impl LineItem {
    /// Selling price per unit: `unit_sell`, falling back to `unit_price`.
    pub fn sell_price(&self) -> Decimal {
        self.unit_sell.unwrap_or(self.unit_price)
    }
}

/// Derived net/VAT/gross figures of a document. Never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    /// Sum of rounded line nets before line discounts.
    pub subtotal_net: Decimal,
    /// Sum of rounded line discounts.
    pub line_discount_total: Decimal,
    /// Net after line discounts.
    pub item_net_after_discount: Decimal,
    /// Document-level absolute discount.
    pub additional_discount_abs: Decimal,
    /// VAT per tax key, rounded per group.
    pub vat_by_key: BTreeMap<String, Decimal>,
    pub total_vat: Decimal,
    pub grand_total_gross: Decimal,
}

/// Postal address as captured in the client snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub company: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Client data frozen onto a document at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub name: String,
    pub billing_address: Address,
    /// USt-IdNr.
    pub vat_id: Option<String>,
    pub currency: Option<String>,
    pub default_tax_key: Option<String>,
}

impl ClientSnapshot {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            billing_address: Address::default(),
            vat_id: None,
            currency: None,
            default_tax_key: None,
        }
    }
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Bank,
    Cash,
    Card,
    Other,
}

/// An append-only payment against an invoice. Amounts are gross.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: DocumentId,
    pub invoice_id: DocumentId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub paid_at: NaiveDate,
    pub note: Option<String>,
}
