//! Booking error types.

use availability::AvailabilityError;
use common::{BookingId, ServiceId, SlotId};
use ledger::{BookingStatus, LedgerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::log::SagaLogError;

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SlotUnavailable,
    SlotNotFound,
    ServiceNotFound,
    PersistenceError,
    Unauthorized,
    AlreadyTerminal,
    BookingNotFound,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SlotUnavailable => "SLOT_UNAVAILABLE",
            ErrorKind::SlotNotFound => "SLOT_NOT_FOUND",
            ErrorKind::ServiceNotFound => "SERVICE_NOT_FOUND",
            ErrorKind::PersistenceError => "PERSISTENCE_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::AlreadyTerminal => "ALREADY_TERMINAL",
            ErrorKind::BookingNotFound => "BOOKING_NOT_FOUND",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by booking and cancellation requests.
#[derive(Debug, Error)]
pub enum BookingError {
    /// The slot is booked, locked by someone else, or withdrawn.
    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    /// The slot does not exist.
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    /// A requested service is not offered by the salon.
    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),

    /// A store could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The caller may not perform this operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The booking is already cancelled or completed.
    #[error("Booking {booking_id} is already {status}")]
    AlreadyTerminal {
        booking_id: BookingId,
        status: BookingStatus,
    },

    /// The booking does not exist.
    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::SlotUnavailable(_) => ErrorKind::SlotUnavailable,
            BookingError::SlotNotFound(_) => ErrorKind::SlotNotFound,
            BookingError::ServiceNotFound(_) => ErrorKind::ServiceNotFound,
            BookingError::Persistence(_) => ErrorKind::PersistenceError,
            BookingError::Unauthorized(_) => ErrorKind::Unauthorized,
            BookingError::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
            BookingError::BookingNotFound(_) => ErrorKind::BookingNotFound,
            BookingError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

impl From<AvailabilityError> for BookingError {
    fn from(e: AvailabilityError) -> Self {
        match e {
            AvailabilityError::SlotNotFound(id) => BookingError::SlotNotFound(id),
            AvailabilityError::InvalidTtl(_) => BookingError::InvalidRequest(e.to_string()),
            other => BookingError::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for BookingError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => BookingError::BookingNotFound(id),
            LedgerError::DuplicateService(_)
            | LedgerError::EmptyBooking
            | LedgerError::InvalidAmount(_) => {
                BookingError::InvalidRequest(e.to_string())
            }
            other => BookingError::Persistence(other.to_string()),
        }
    }
}

impl From<SagaLogError> for BookingError {
    fn from(e: SagaLogError) -> Self {
        BookingError::Persistence(e.to_string())
    }
}

/// Convenience type alias for booking results.
pub type Result<T> = std::result::Result<T, BookingError>;
