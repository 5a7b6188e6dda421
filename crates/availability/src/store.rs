use async_trait::async_trait;
use chrono::Duration;
use common::{BookingId, SlotId, UserId};

use crate::{
    AcquireOutcome, FinalizeOutcome, ReleaseOutcome, Result, Slot, SlotLock, SlotQuery,
    SlotRelease,
};

/// Grants short-lived exclusive holds on slots.
///
/// All implementations must be thread-safe (Send + Sync) and must make the
/// slot-state check and the lock write a single serialized unit, so two
/// concurrent `acquire` calls on the same slot never both succeed.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquires (or renews) a lock on a slot for `holder`.
    ///
    /// Returns `Conflict` if the slot is booked, unavailable, or holds a live
    /// lock owned by a different holder. Re-acquisition by the same holder
    /// extends the expiry. Fails with `SlotNotFound` for unknown slots.
    async fn acquire(&self, slot_id: SlotId, holder: UserId, ttl: Duration)
    -> Result<AcquireOutcome>;

    /// Releases the lock held by `holder`.
    ///
    /// Locks owned by other holders are never touched. Returns `NotFound` if
    /// the caller holds no live lock on the slot; an expired row is left for
    /// `purge_expired`.
    async fn release(&self, slot_id: SlotId, holder: UserId) -> Result<ReleaseOutcome>;

    /// Returns the live lock on a slot, if any.
    async fn current_lock(&self, slot_id: SlotId) -> Result<Option<SlotLock>>;

    /// Physically deletes expired lock rows and returns how many were removed.
    ///
    /// Pure housekeeping: expiry is always evaluated at acquire time.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Authoritative availability state of every bookable slot.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Returns slots that are available, not booked and not live-locked,
    /// ordered by time.
    async fn get_available(&self, query: SlotQuery) -> Result<Vec<Slot>>;

    /// Returns a slot by id regardless of its state.
    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>>;

    /// Marks the slot booked by `booking_id`.
    ///
    /// Re-checks `booked == false` in the same atomic unit as the write and
    /// returns `AlreadyBooked` instead of overwriting. Any lock on the slot is
    /// removed in the same unit.
    async fn finalize(&self, slot_id: SlotId, booking_id: BookingId) -> Result<FinalizeOutcome>;

    /// Clears `booked` if, and only if, the slot is booked by `booking_id`.
    ///
    /// Idempotent; a slot that is not booked by that booking is left alone.
    async fn release_slot(&self, slot_id: SlotId, booking_id: BookingId) -> Result<SlotRelease>;

    /// Ingests slots produced by external slot generation.
    ///
    /// Existing slots are updated in place unless they are booked; returns the
    /// number of rows written.
    async fn import_slots(&self, slots: Vec<Slot>) -> Result<u64>;
}
