use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, SalonId, UserId};

use crate::{Booking, BookingStatus, NewBooking, Result, SalonBookingFilter};

/// Durable record of bookings and their items.
///
/// Every status change goes through a [`LedgerTransaction`] so it is made
/// against a row read under an exclusive lock.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    /// Gets a booking by id, outside any transaction.
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Lists a customer's bookings, newest first.
    async fn list_for_customer(
        &self,
        customer_id: UserId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>>;

    /// Lists a salon's bookings ordered by appointment date and time.
    async fn list_for_salon(
        &self,
        salon_id: SalonId,
        filter: SalonBookingFilter,
    ) -> Result<Vec<Booking>>;

    /// Returns up to `limit` `PENDING` bookings created before `created_before`,
    /// oldest first.
    async fn find_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>>;
}

/// A unit of work against the ledger.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// its writes.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Inserts a `PENDING` booking with its items.
    async fn insert(&mut self, booking: NewBooking) -> Result<Booking>;

    /// Reads a booking and holds an exclusive lock on it until the
    /// transaction ends.
    async fn get_for_update(&mut self, id: BookingId) -> Result<Option<Booking>>;

    /// Changes the status of a booking.
    ///
    /// The current status is re-read under the exclusive lock and the change
    /// is rejected with `InvalidTransition` if the state machine forbids it.
    async fn set_status(&mut self, id: BookingId, status: BookingStatus) -> Result<Booking>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
