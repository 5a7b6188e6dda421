//! Booking ledger.
//!
//! The durable record of what was sold: bookings, their price-snapshotted
//! items, and their status. Status changes are only made inside a
//! [`LedgerTransaction`] against a row read under an exclusive lock.

pub mod booking;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod status;
pub mod store;

pub use booking::{Booking, BookingItem, NewBooking, SalonBookingFilter};
pub use error::{LedgerError, Result};
pub use memory::InMemoryBookingLedger;
pub use postgres::{PostgresBookingLedger, PostgresLedgerTransaction};
pub use status::{BookingStatus, ParseBookingStatusError};
pub use store::{BookingLedger, LedgerTransaction};
