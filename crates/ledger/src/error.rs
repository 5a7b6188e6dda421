use common::{BookingId, ServiceId};
use thiserror::Error;

use crate::BookingStatus;

/// Errors that can occur when reading or writing the booking ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The booking does not exist.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// A booking with this id already exists.
    #[error("Booking already exists: {0}")]
    AlreadyExists(BookingId),

    /// The requested status change is not allowed from the current status.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    /// The same service appears twice in one booking.
    #[error("Duplicate service in booking: {0}")]
    DuplicateService(ServiceId),

    /// A booking must have at least one item.
    #[error("Booking has no items")]
    EmptyBooking,

    /// An item price is negative or the total does not fit in cents.
    #[error("Invalid booking amount: {0}")]
    InvalidAmount(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back into a booking.
    #[error("Corrupt booking row: {0}")]
    CorruptRow(String),

    /// Injected failure used by the in-memory ledger in tests.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
