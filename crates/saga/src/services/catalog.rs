//! Catalog lookup port and adapters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, SalonId, ServiceId};
use ledger::BookingItem;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// A salon service as offered by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceInfo {
    pub id: ServiceId,
    pub name: String,
    #[serde(deserialize_with = "deserialize_price")]
    pub price: Money,
    #[serde(alias = "durationMinutes")]
    pub duration_minutes: u32,
}

impl ServiceInfo {
    pub fn new(id: ServiceId, name: impl Into<String>, price: Money, duration_minutes: u32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            duration_minutes,
        }
    }

    /// Snapshots the current price and duration into a booking line item.
    pub fn to_item(&self) -> BookingItem {
        BookingItem {
            service_id: self.id,
            service_name: self.name.clone(),
            price: self.price,
            duration_minutes: self.duration_minutes,
        }
    }
}

/// The catalog serves prices either as decimal strings or JSON numbers.
fn deserialize_price<'de, D>(deserializer: D) -> Result<Money, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Price {
        Text(String),
        Number(serde_json::Number),
    }

    let raw = match Price::deserialize(deserializer)? {
        Price::Text(s) => s,
        Price::Number(n) => n.to_string(),
    };
    Money::parse_decimal(&raw).map_err(serde::de::Error::custom)
}

/// Errors from a catalog lookup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog request failed: {0}")]
    Transport(String),

    #[error("Catalog returned status {0}")]
    Status(u16),

    #[error("Invalid catalog response: {0}")]
    Decode(String),
}

/// Resolves service identifiers to price and duration.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Looks up one service of a salon. `Ok(None)` if the salon does not offer it.
    async fn get_service(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
    ) -> Result<Option<ServiceInfo>, CatalogError>;
}

/// In-memory catalog for tests and database-less deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    services: Arc<RwLock<HashMap<(SalonId, ServiceId), ServiceInfo>>>,
    fail_on_lookup: Arc<AtomicBool>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service offered by `salon_id`.
    pub async fn add_service(&self, salon_id: SalonId, service: ServiceInfo) {
        self.services
            .write()
            .await
            .insert((salon_id, service.id), service);
    }

    /// Changes the price of a registered service. Returns false if unknown.
    pub async fn set_price(&self, salon_id: SalonId, service_id: ServiceId, price: Money) -> bool {
        match self.services.write().await.get_mut(&(salon_id, service_id)) {
            Some(service) => {
                service.price = price;
                true
            }
            None => false,
        }
    }

    /// Makes subsequent lookups fail with a transport error.
    pub fn set_fail_on_lookup(&self, fail: bool) {
        self.fail_on_lookup.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_service(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
    ) -> Result<Option<ServiceInfo>, CatalogError> {
        if self.fail_on_lookup.load(Ordering::SeqCst) {
            return Err(CatalogError::Transport("catalog unreachable".to_string()));
        }
        Ok(self
            .services
            .read()
            .await
            .get(&(salon_id, service_id))
            .cloned())
    }
}

/// Catalog backed by the salon service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    /// Creates a client for the salon service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    #[tracing::instrument(skip(self), fields(%salon_id, %service_id))]
    async fn get_service(
        &self,
        salon_id: SalonId,
        service_id: ServiceId,
    ) -> Result<Option<ServiceInfo>, CatalogError> {
        let url = format!(
            "{}/api/v1/salons/{}/services/{}",
            self.base_url, salon_id, service_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        debug!(status = %status, "catalog response received");

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let service = response
            .json::<ServiceInfo>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        Ok(Some(service))
    }
}
