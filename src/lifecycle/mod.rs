//! Offer → order → invoice lifecycle, payments and their persistence.
//!
//! Documents are tagged variants over a shared [`DocumentBase`]. Content
//! is editable only in the initial state (`draft` / `open`); every state
//! change and every payment is written in a single unit of work by
//! [`DocumentService`].

mod document;
mod service;
mod state;

pub use document::{Document, DocumentBase, Invoice, Offer, Order};
pub use service::{Catalogs, DocumentService};
pub use state::{DocumentState, InvoiceState, OfferState, OrderState};
