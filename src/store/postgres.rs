use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::{info, instrument};

use crate::core::{CounterKey, DocumentId, DocumentNumber, DocumentType, NumberCounter, Payment};
use crate::lifecycle::{Document, InvoiceState};

use super::{Store, StoreError, UnitOfWork};

// `number` is display text; uniqueness and ordering use (year, seq).
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS number_counters (
    id            TEXT PRIMARY KEY,
    document_type TEXT NOT NULL,
    year          INTEGER NOT NULL,
    seq           BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id            TEXT PRIMARY KEY,
    document_type TEXT NOT NULL,
    number        TEXT NOT NULL,
    year          INTEGER NOT NULL,
    seq           BIGINT NOT NULL,
    state         TEXT NOT NULL,
    body          JSONB NOT NULL,
    UNIQUE (document_type, year, seq)
);

CREATE INDEX IF NOT EXISTS documents_state_idx ON documents (document_type, state, year, seq);

CREATE TABLE IF NOT EXISTS payments (
    id         TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL REFERENCES documents (id),
    booked_at  BIGSERIAL,
    body       JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS payments_invoice_idx ON payments (invoice_id, booked_at);
"#;

const INVOICES_IN_STATE: &str =
    "SELECT id FROM documents WHERE document_type = $1 AND state = $2 ORDER BY year, seq";

/// PostgreSQL store. Every unit of work is a SERIALIZABLE transaction.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and create the schema if missing.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        info!(max_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_err)?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(map_err)?;
        info!("schema ready");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn next_seq(&mut self, key: CounterKey) -> Result<u64, StoreError> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO number_counters (id, document_type, year, seq)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (id) DO UPDATE SET seq = number_counters.seq + 1
            RETURNING seq
            "#,
        )
        .bind(key.id())
        .bind(key.document_type.code())
        .bind(key.year)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_err)?;
        u64::try_from(seq).map_err(|_| StoreError::Integrity(format!("counter {key} is negative")))
    }

    async fn counter(&mut self, key: CounterKey) -> Result<Option<NumberCounter>, StoreError> {
        let row = sqlx::query("SELECT seq FROM number_counters WHERE id = $1")
            .bind(key.id())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_err)?;
        row.map(|r| {
            let seq: i64 = r.try_get("seq").map_err(map_err)?;
            Ok(NumberCounter {
                seq: u64::try_from(seq)
                    .map_err(|_| StoreError::Integrity(format!("counter {key} is negative")))?,
                ..NumberCounter::empty(key)
            })
        })
        .transpose()
    }

    async fn document(&mut self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let body: Option<Json<Document>> =
            sqlx::query_scalar("SELECT body FROM documents WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_err)?;
        Ok(body.map(|Json(doc)| doc))
    }

    async fn insert(&mut self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, document_type, number, year, seq, state, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document.id().as_str())
        .bind(document.document_type().code())
        .bind(document.number().to_string())
        .bind(document.number().year())
        .bind(seq_column(document.number())?)
        .bind(document.state().code())
        .bind(Json(document))
        .execute(&mut *self.tx)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn update(&mut self, document: &Document) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET state = $2, body = $3 WHERE id = $1")
            .bind(document.id().as_str())
            .bind(document.state().code())
            .bind(Json(document))
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Integrity(format!(
                "document {} does not exist",
                document.id()
            )));
        }
        Ok(())
    }

    async fn append_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO payments (id, invoice_id, body) VALUES ($1, $2, $3)")
            .bind(payment.id.as_str())
            .bind(payment.invoice_id.as_str())
            .bind(Json(payment))
            .execute(&mut *self.tx)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn payments(&mut self, invoice_id: &DocumentId) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<Json<Payment>> = sqlx::query_scalar(
            "SELECT body FROM payments WHERE invoice_id = $1 ORDER BY booked_at",
        )
        .bind(invoice_id.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_err)?;
        Ok(rows.into_iter().map(|Json(p)| p).collect())
    }

    async fn invoices_in_state(&mut self, state: InvoiceState) -> Result<Vec<DocumentId>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(INVOICES_IN_STATE)
        .bind(DocumentType::Invoice.code())
        .bind(state.code())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_err)?;
        Ok(ids.into_iter().map(DocumentId::from).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_err)
    }
}

fn seq_column(number: DocumentNumber) -> Result<i64, StoreError> {
    i64::try_from(number.seq())
        .map_err(|_| StoreError::Integrity(format!("sequence of {number} exceeds BIGINT")))
}

/// Serialization failures (40001) and deadlocks (40P01) are conflicts the
/// caller retries; unique and foreign-key violations are integrity errors.
fn map_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some("40001") | Some("40P01") => return StoreError::Conflict(db.message().to_string()),
            _ if db.is_unique_violation() || db.is_foreign_key_violation() => {
                return StoreError::Integrity(db.message().to_string());
            }
            _ => {}
        }
    }
    StoreError::Backend(err.to_string())
}
