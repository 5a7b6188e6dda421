//! Append-only saga event log.
//!
//! Every step of a booking saga is recorded here so recovery tooling can
//! replay a saga and find the ones that never reached a terminal state.

mod memory;
mod postgres;

pub use memory::InMemorySagaLog;
pub use postgres::PostgresSagaLog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use thiserror::Error;

use crate::events::SagaEvent;

/// Errors from the saga log.
#[derive(Debug, Error)]
pub enum SagaLogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Injected failure used by the in-memory log in tests.
    #[error("Saga log unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SagaLogError>;

/// Storage for saga events.
#[async_trait]
pub trait SagaLog: Send + Sync {
    /// Appends one event to a saga's history.
    async fn append(
        &self,
        saga_id: SagaId,
        event: &SagaEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Loads a saga's events in append order. Empty if the saga is unknown.
    async fn load(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>>;

    /// Lists sagas started before `older_than` that have no terminal event,
    /// oldest first.
    async fn stuck_sagas(&self, older_than: DateTime<Utc>) -> Result<Vec<SagaId>>;
}
