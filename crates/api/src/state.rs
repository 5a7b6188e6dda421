//! Shared application state and store wiring.

use std::sync::Arc;

use availability::{
    AvailabilityError, InMemorySlotStore, LockManager, LockSweeper, PostgresSlotStore, SlotStore,
};
use ledger::{BookingLedger, InMemoryBookingLedger, PostgresBookingLedger};
use saga::{
    BookingCoordinator, Catalog, CatalogError, HttpCatalog, HttpNotificationSink,
    InMemoryCatalog, InMemorySagaLog, LogNotificationSink, NotificationError, NotificationSink,
    PendingBookingReconciler, PostgresSagaLog, SagaLog,
};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::config::Config;

/// Which storage backend the process runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: BookingCoordinator,
    pub slots: Arc<dyn SlotStore>,
    pub locks: Arc<dyn LockManager>,
    /// TTL for client-requested locks that do not name a duration.
    pub lock_ttl: chrono::Duration,
    pub storage: StorageBackend,
}

impl AppState {
    pub fn new(
        coordinator: BookingCoordinator,
        slots: Arc<dyn SlotStore>,
        locks: Arc<dyn LockManager>,
        storage: StorageBackend,
    ) -> Self {
        let lock_ttl = coordinator.config().lock_ttl;
        Self {
            coordinator,
            slots,
            locks,
            lock_ttl,
            storage,
        }
    }
}

/// Errors raised while wiring the application at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] AvailabilityError),

    #[error("Catalog client: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Notification client: {0}")]
    Notification(#[from] NotificationError),
}

/// Stores backing the coordinator.
struct Stores {
    slots: Arc<dyn SlotStore>,
    locks: Arc<dyn LockManager>,
    ledger: Arc<dyn BookingLedger>,
    log: Arc<dyn SagaLog>,
    backend: StorageBackend,
}

impl Stores {
    fn in_memory() -> Self {
        let slots = InMemorySlotStore::new();
        Self {
            slots: Arc::new(slots.clone()),
            locks: Arc::new(slots),
            ledger: Arc::new(InMemoryBookingLedger::new()),
            log: Arc::new(InMemorySagaLog::new()),
            backend: StorageBackend::Memory,
        }
    }

    async fn postgres(url: &str, max_connections: u32) -> Result<Self, StartupError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let slots = PostgresSlotStore::new(pool.clone());
        slots.run_migrations().await?;

        Ok(Self {
            slots: Arc::new(slots.clone()),
            locks: Arc::new(slots),
            ledger: Arc::new(PostgresBookingLedger::new(pool.clone())),
            log: Arc::new(PostgresSagaLog::new(pool)),
            backend: StorageBackend::Postgres,
        })
    }
}

/// Everything the binary runs: the HTTP state and the background tasks.
pub struct Application {
    pub state: Arc<AppState>,
    pub sweeper: LockSweeper,
    pub reconciler: PendingBookingReconciler,
}

/// Builds the application from configuration.
///
/// PostgreSQL stores are used when `DATABASE_URL` is set (migrations are
/// applied first), in-memory stores otherwise. Collaborator URLs select the
/// HTTP adapters; without them the catalog is empty and notifications are
/// only logged.
pub async fn build(config: &Config) -> Result<Application, StartupError> {
    let stores = match &config.database_url {
        Some(url) => Stores::postgres(url, config.database_max_connections).await?,
        None => Stores::in_memory(),
    };
    tracing::info!(storage = ?stores.backend, "stores ready");

    let catalog: Arc<dyn Catalog> = match &config.catalog_url {
        Some(url) => Arc::new(HttpCatalog::new(url.as_str(), config.catalog_timeout)?),
        None => {
            tracing::warn!("CATALOG_URL not set; using an empty in-memory catalog");
            Arc::new(InMemoryCatalog::new())
        }
    };
    let notifier: Arc<dyn NotificationSink> = match &config.notification_url {
        Some(url) => Arc::new(HttpNotificationSink::new(url.as_str(), config.notify_timeout)?),
        None => Arc::new(LogNotificationSink),
    };

    let coordinator = BookingCoordinator::new(
        stores.slots.clone(),
        stores.locks.clone(),
        stores.ledger.clone(),
        catalog,
        notifier,
        stores.log,
    )
    .with_config(config.saga_config());

    let sweeper = LockSweeper::new(config.sweeper_config(), stores.locks.clone());
    let reconciler = PendingBookingReconciler::new(
        config.reconciler_config(),
        stores.slots.clone(),
        stores.ledger,
    );

    let state = Arc::new(AppState::new(
        coordinator,
        stores.slots,
        stores.locks,
        stores.backend,
    ));

    Ok(Application {
        state,
        sweeper,
        reconciler,
    })
}
