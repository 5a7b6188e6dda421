use common::SlotId;
use thiserror::Error;

/// Errors that can occur when interacting with the slot store or lock manager.
#[derive(Debug, Error)]
pub enum AvailabilityError {
    /// The slot does not exist.
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    /// A lock was requested with a zero or negative time-to-live.
    #[error("Lock TTL must be positive, got {0} seconds")]
    InvalidTtl(i64),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back into a slot.
    #[error("Corrupt slot row: {0}")]
    CorruptRow(String),

    /// Injected failure used by the in-memory store in tests.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for availability operations.
pub type Result<T> = std::result::Result<T, AvailabilityError>;
