//! External catalogs the engine reads from: materials, personnel, clients.
//!
//! Lookups are the only I/O-bound calls in the engine. Callers bound them
//! with a timeout; dropping the returned future cancels the lookup.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::ClientSnapshot;

/// Failure of a catalog backend.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// The backend could not be reached.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with something unusable.
    #[error("catalog error: {0}")]
    Backend(String),
}

/// Material library: purchase price per unit.
#[async_trait]
pub trait MaterialCatalog: Send + Sync {
    /// `Ok(None)` if the material is unknown.
    async fn unit_price(&self, material_id: &str) -> Result<Option<Decimal>, CatalogError>;
}

/// Personnel records: internal hourly rate.
#[async_trait]
pub trait PersonnelCatalog: Send + Sync {
    /// `Ok(None)` if the person is unknown.
    async fn hourly_rate(&self, personnel_id: &str) -> Result<Option<Decimal>, CatalogError>;
}

/// Client master data, snapshotted onto documents at creation.
#[async_trait]
pub trait ClientCatalog: Send + Sync {
    /// `Ok(None)` if the client is unknown.
    async fn get(&self, client_id: &str) -> Result<Option<ClientSnapshot>, CatalogError>;
}

/// HashMap-backed catalog for all three lookups.
///
/// An optional artificial latency and an "offline" switch make timeout and
/// fallback paths reproducible.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    materials: HashMap<String, Decimal>,
    personnel: HashMap<String, Decimal>,
    clients: HashMap<String, ClientSnapshot>,
    latency: Option<Duration>,
    offline: bool,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_material(mut self, id: impl Into<String>, unit_price: Decimal) -> Self {
        self.materials.insert(id.into(), unit_price);
        self
    }

    pub fn with_personnel(mut self, id: impl Into<String>, hourly_rate: Decimal) -> Self {
        self.personnel.insert(id.into(), hourly_rate);
        self
    }

    pub fn with_client(mut self, id: impl Into<String>, client: ClientSnapshot) -> Self {
        self.clients.insert(id.into(), client);
        self
    }

    /// Delay every lookup by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every lookup with [`CatalogError::Unavailable`].
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    async fn before_lookup(&self) -> Result<(), CatalogError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline {
            return Err(CatalogError::Unavailable("catalog is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MaterialCatalog for InMemoryCatalog {
    async fn unit_price(&self, material_id: &str) -> Result<Option<Decimal>, CatalogError> {
        self.before_lookup().await?;
        Ok(self.materials.get(material_id).copied())
    }
}

#[async_trait]
impl PersonnelCatalog for InMemoryCatalog {
    async fn hourly_rate(&self, personnel_id: &str) -> Result<Option<Decimal>, CatalogError> {
        self.before_lookup().await?;
        Ok(self.personnel.get(personnel_id).copied())
    }
}

#[async_trait]
impl ClientCatalog for InMemoryCatalog {
    async fn get(&self, client_id: &str) -> Result<Option<ClientSnapshot>, CatalogError> {
        self.before_lookup().await?;
        Ok(self.clients.get(client_id).cloned())
    }
}
