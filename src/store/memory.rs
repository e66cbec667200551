use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::core::{CounterKey, DocumentId, DocumentNumber, DocumentType, NumberCounter, Payment};
use crate::lifecycle::{Document, DocumentState, InvoiceState};

use super::{Store, StoreError, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    counters: HashMap<CounterKey, NumberCounter>,
    documents: HashMap<DocumentId, Document>,
    numbers: HashSet<(DocumentType, DocumentNumber)>,
    payments: Vec<Payment>,
}

/// In-process store.
///
/// A unit of work holds the store lock from `begin` until it is committed
/// or dropped, so units of work run one at a time and are trivially
/// serializable. Writes go straight to the shared tables and record an
/// undo entry; dropping the unit of work without a successful commit
/// replays the undo log in reverse.
///
/// [`MemoryStore::fail_next_commits`] makes the next commits fail with
/// [`StoreError::Conflict`] to exercise retry paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `n` commits fail with a conflict.
    pub fn fail_next_commits(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of documents committed so far.
    pub async fn document_count(&self) -> usize {
        self.tables.lock().await.documents.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            undo: Vec::new(),
            injected_conflicts: Arc::clone(&self.injected_conflicts),
        }))
    }
}

/// Prior state of one entry touched by a unit of work.
#[derive(Debug)]
enum Undo {
    Counter(CounterKey, Option<NumberCounter>),
    Document(DocumentId, Option<Document>),
    Number((DocumentType, DocumentNumber)),
    Payments(usize),
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    injected_conflicts: Arc<AtomicU32>,
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        debug!(entries = self.undo.len(), "memory store: rolling back unit of work");
        let tables = &mut *self.guard;
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Counter(key, Some(prior)) => {
                    tables.counters.insert(key, prior);
                }
                Undo::Counter(key, None) => {
                    tables.counters.remove(&key);
                }
                Undo::Document(id, Some(prior)) => {
                    tables.documents.insert(id, prior);
                }
                Undo::Document(id, None) => {
                    tables.documents.remove(&id);
                }
                Undo::Number(number) => {
                    tables.numbers.remove(&number);
                }
                Undo::Payments(len) => tables.payments.truncate(len),
            }
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn next_seq(&mut self, key: CounterKey) -> Result<u64, StoreError> {
        let counters = &mut self.guard.counters;
        self.undo.push(Undo::Counter(key, counters.get(&key).cloned()));
        let counter = counters
            .entry(key)
            .or_insert_with(|| NumberCounter::empty(key));
        counter.seq += 1;
        Ok(counter.seq)
    }

    async fn counter(&mut self, key: CounterKey) -> Result<Option<NumberCounter>, StoreError> {
        Ok(self.guard.counters.get(&key).cloned())
    }

    async fn document(&mut self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.guard.documents.get(id).cloned())
    }

    async fn insert(&mut self, document: &Document) -> Result<(), StoreError> {
        if self.guard.documents.contains_key(document.id()) {
            return Err(StoreError::Integrity(format!(
                "document id {} already exists",
                document.id()
            )));
        }
        let number = (document.document_type(), document.number());
        if !self.guard.numbers.insert(number) {
            return Err(StoreError::Integrity(format!(
                "{} number {} already issued",
                document.document_type(),
                document.number()
            )));
        }
        self.undo.push(Undo::Number(number));
        self.guard
            .documents
            .insert(document.id().clone(), document.clone());
        self.undo.push(Undo::Document(document.id().clone(), None));
        Ok(())
    }

    async fn update(&mut self, document: &Document) -> Result<(), StoreError> {
        match self.guard.documents.get_mut(document.id()) {
            Some(slot) => {
                let prior = std::mem::replace(slot, document.clone());
                self.undo.push(Undo::Document(document.id().clone(), Some(prior)));
                Ok(())
            }
            None => Err(StoreError::Integrity(format!(
                "document {} does not exist",
                document.id()
            ))),
        }
    }

    async fn append_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        if !self.guard.documents.contains_key(&payment.invoice_id) {
            return Err(StoreError::Integrity(format!(
                "payment references unknown invoice {}",
                payment.invoice_id
            )));
        }
        self.undo.push(Undo::Payments(self.guard.payments.len()));
        self.guard.payments.push(payment.clone());
        Ok(())
    }

    async fn payments(&mut self, invoice_id: &DocumentId) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .guard
            .payments
            .iter()
            .filter(|p| &p.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn invoices_in_state(&mut self, state: InvoiceState) -> Result<Vec<DocumentId>, StoreError> {
        let mut ids: Vec<_> = self
            .guard
            .documents
            .values()
            .filter(|d| d.state() == DocumentState::Invoice(state))
            .map(|d| (d.number(), d.id().clone()))
            .collect();
        ids.sort();
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!("memory store: injected commit conflict");
            return Err(StoreError::Conflict("injected conflict".into()));
        }
        self.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_start_at_one_per_key() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let inv25 = CounterKey::new(DocumentType::Invoice, 2025);
        let inv26 = CounterKey::new(DocumentType::Invoice, 2026);
        let off25 = CounterKey::new(DocumentType::Offer, 2025);
        assert_eq!(uow.next_seq(inv25).await.unwrap(), 1);
        assert_eq!(uow.next_seq(inv25).await.unwrap(), 2);
        assert_eq!(uow.next_seq(inv26).await.unwrap(), 1);
        assert_eq!(uow.next_seq(off25).await.unwrap(), 1);
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        let row = uow.counter(inv25).await.unwrap().unwrap();
        assert_eq!(row.id, "invoice-2025");
        assert_eq!(row.seq, 2);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = MemoryStore::new();
        let key = CounterKey::new(DocumentType::Order, 2025);
        {
            let mut uow = store.begin().await.unwrap();
            uow.next_seq(key).await.unwrap();
        }
        let mut uow = store.begin().await.unwrap();
        assert!(uow.counter(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_conflict_discards_writes() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let key = CounterKey::new(DocumentType::Invoice, 2025);

        let mut uow = store.begin().await.unwrap();
        uow.next_seq(key).await.unwrap();
        assert!(matches!(uow.commit().await, Err(StoreError::Conflict(_))));

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.next_seq(key).await.unwrap(), 1);
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn rollback_restores_prior_values() {
        let store = MemoryStore::new();
        let key = CounterKey::new(DocumentType::Invoice, 2025);
        let mut uow = store.begin().await.unwrap();
        uow.next_seq(key).await.unwrap();
        uow.next_seq(key).await.unwrap();
        uow.commit().await.unwrap();

        store.fail_next_commits(1);
        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.next_seq(key).await.unwrap(), 3);
        assert_eq!(uow.next_seq(key).await.unwrap(), 4);
        // Reads inside the unit of work see its own writes.
        assert_eq!(uow.counter(key).await.unwrap().unwrap().seq, 4);
        assert!(uow.commit().await.is_err());

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.counter(key).await.unwrap().unwrap().seq, 2);
    }
}
