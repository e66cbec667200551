use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::DocumentType;

/// Offer: `draft → sent → accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferState {
    Draft,
    Sent,
    Accepted,
}

/// Order: `open → in-progress → done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderState {
    Open,
    InProgress,
    Done,
}

/// Invoice: `draft → sent → (overdue) → paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvoiceState {
    Draft,
    Sent,
    Overdue,
    Paid,
}

impl OfferState {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Accepted => "accepted",
        }
    }

    fn can_move_to(self, to: Self) -> bool {
        matches!((self, to), (Self::Draft, Self::Sent) | (Self::Sent, Self::Accepted))
    }
}

impl OrderState {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }

    fn can_move_to(self, to: Self) -> bool {
        matches!((self, to), (Self::Open, Self::InProgress) | (Self::InProgress, Self::Done))
    }
}

impl InvoiceState {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            "overdue" => Some(Self::Overdue),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }

    /// Edge check only; the due-date and open-amount guards live on the
    /// invoice.
    fn can_move_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Sent)
                | (Self::Sent, Self::Overdue)
                | (Self::Sent, Self::Paid)
                | (Self::Overdue, Self::Paid)
        )
    }

    /// States in which payments are accepted.
    pub fn accepts_payments(&self) -> bool {
        matches!(self, Self::Sent | Self::Overdue | Self::Paid)
    }
}

/// State of any document, tagged by document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "document_type", content = "state", rename_all = "lowercase")]
pub enum DocumentState {
    Offer(OfferState),
    Order(OrderState),
    Invoice(InvoiceState),
}

impl DocumentState {
    /// State a freshly created document of this type starts in.
    pub fn initial(document_type: DocumentType) -> Self {
        match document_type {
            DocumentType::Offer => Self::Offer(OfferState::Draft),
            DocumentType::Order => Self::Order(OrderState::Open),
            DocumentType::Invoice => Self::Invoice(InvoiceState::Draft),
        }
    }

    pub fn document_type(&self) -> DocumentType {
        match self {
            Self::Offer(_) => DocumentType::Offer,
            Self::Order(_) => DocumentType::Order,
            Self::Invoice(_) => DocumentType::Invoice,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Offer(s) => s.code(),
            Self::Order(s) => s.code(),
            Self::Invoice(s) => s.code(),
        }
    }

    /// Line items, tax keys and discount may only change in the initial state.
    pub fn is_mutable(&self) -> bool {
        *self == Self::initial(self.document_type())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Offer(OfferState::Accepted)
                | Self::Order(OrderState::Done)
                | Self::Invoice(InvoiceState::Paid)
        )
    }

    /// Whether `self → to` is an edge of the lifecycle graph.
    pub fn can_move_to(&self, to: Self) -> bool {
        match (*self, to) {
            (Self::Offer(from), Self::Offer(to)) => from.can_move_to(to),
            (Self::Order(from), Self::Order(to)) => from.can_move_to(to),
            (Self::Invoice(from), Self::Invoice(to)) => from.can_move_to(to),
            _ => false,
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.document_type(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_initial_states_are_mutable() {
        assert!(DocumentState::Offer(OfferState::Draft).is_mutable());
        assert!(!DocumentState::Offer(OfferState::Sent).is_mutable());
        assert!(DocumentState::Order(OrderState::Open).is_mutable());
        assert!(!DocumentState::Order(OrderState::InProgress).is_mutable());
        assert!(DocumentState::Invoice(InvoiceState::Draft).is_mutable());
        assert!(!DocumentState::Invoice(InvoiceState::Overdue).is_mutable());
    }

    #[test]
    fn lifecycle_edges() {
        use DocumentState::*;
        assert!(Offer(OfferState::Draft).can_move_to(Offer(OfferState::Sent)));
        assert!(!Offer(OfferState::Draft).can_move_to(Offer(OfferState::Accepted)));
        assert!(!Offer(OfferState::Accepted).can_move_to(Offer(OfferState::Draft)));
        assert!(Order(OrderState::InProgress).can_move_to(Order(OrderState::Done)));
        assert!(!Order(OrderState::Open).can_move_to(Order(OrderState::Done)));
        assert!(Invoice(InvoiceState::Overdue).can_move_to(Invoice(InvoiceState::Paid)));
        assert!(!Invoice(InvoiceState::Draft).can_move_to(Invoice(InvoiceState::Paid)));
        assert!(!Invoice(InvoiceState::Paid).can_move_to(Invoice(InvoiceState::Sent)));
        assert!(!Offer(OfferState::Draft).can_move_to(Invoice(InvoiceState::Sent)));
    }

    #[test]
    fn terminal_states() {
        assert!(DocumentState::Offer(OfferState::Accepted).is_terminal());
        assert!(DocumentState::Order(OrderState::Done).is_terminal());
        assert!(DocumentState::Invoice(InvoiceState::Paid).is_terminal());
        assert!(!DocumentState::Invoice(InvoiceState::Overdue).is_terminal());
    }

    #[test]
    fn state_codes_are_kebab_case() {
        assert_eq!(DocumentState::Order(OrderState::InProgress).code(), "in-progress");
        let json = serde_json::to_string(&DocumentState::Order(OrderState::InProgress)).unwrap();
        assert_eq!(json, r#"{"document_type":"order","state":"in-progress"}"#);
    }
}
