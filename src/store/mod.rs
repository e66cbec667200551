//! Persistence seam for documents, payments and number counters.
//!
//! Every engine write runs inside one [`UnitOfWork`]: the counter
//! increment, the document insert/update and any payment row either all
//! commit or all roll back. Dropping a unit of work without calling
//! [`UnitOfWork::commit`] rolls it back.
//!
//! Backends must run units of work serializably. A unit of work that lost
//! against a concurrent writer fails with [`StoreError::Conflict`]; callers
//! retry through [`retry_on_conflict`].

mod generator;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use generator::{NumberGenerator, RetryPolicy, retry_on_conflict};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{CounterKey, DocumentId, EngineError, NumberCounter, Payment};
use crate::lifecycle::{Document, InvoiceState};

/// Failure of a storage backend.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Serialization failure or deadlock; the unit of work was rolled back.
    #[error("concurrent write conflict: {0}")]
    Conflict(String),
    /// A uniqueness or referential constraint was violated.
    #[error("constraint violated: {0}")]
    Integrity(String),
    /// Anything else the backend reported.
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::Integrity(msg) => EngineError::IntegrityViolation(msg),
            StoreError::Backend(msg) => EngineError::Store(msg),
        }
    }
}

/// Opens units of work.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// One serializable transaction against the store.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Increment the counter for `key` and return the new value.
    ///
    /// A missing counter row is created, so the first call of a year
    /// returns 1.
    async fn next_seq(&mut self, key: CounterKey) -> Result<u64, StoreError>;

    /// Current counter row, if any.
    async fn counter(&mut self, key: CounterKey) -> Result<Option<NumberCounter>, StoreError>;

    async fn document(&mut self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Insert a new document. Fails with `Integrity` if the id or the
    /// (type, number) pair already exists.
    async fn insert(&mut self, document: &Document) -> Result<(), StoreError>;

    /// Overwrite an existing document.
    async fn update(&mut self, document: &Document) -> Result<(), StoreError>;

    /// Append a payment row. Payments are never updated or deleted.
    async fn append_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    /// Payments of an invoice in booking order.
    async fn payments(&mut self, invoice_id: &DocumentId) -> Result<Vec<Payment>, StoreError>;

    /// Ids of all invoices currently in `state`.
    async fn invoices_in_state(&mut self, state: InvoiceState) -> Result<Vec<DocumentId>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
