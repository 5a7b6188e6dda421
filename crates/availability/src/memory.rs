use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use common::{BookingId, Clock, SlotId, SystemClock, UserId};
use tokio::sync::Mutex;

use crate::{
    AcquireOutcome, AvailabilityError, FinalizeOutcome, LockGrant, ReleaseOutcome, Result, Slot,
    SlotLock, SlotQuery, SlotRelease,
    lock::{check_acquire, validate_ttl},
    store::{LockManager, SlotStore},
};

#[derive(Debug, Default)]
struct State {
    slots: HashMap<SlotId, Slot>,
    locks: HashMap<SlotId, SlotLock>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_acquire: AtomicBool,
    fail_on_finalize: AtomicBool,
    fail_on_release_slot: AtomicBool,
}

/// In-memory slot store and lock manager.
///
/// A single mutex guards slots and locks together, so every operation is one
/// serialized read-modify-write, mirroring the row locks of the PostgreSQL
/// implementation.
#[derive(Debug, Clone)]
pub struct InMemorySlotStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    faults: Arc<Faults>,
}

impl Default for InMemorySlotStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemorySlotStore {
    /// Creates a new empty store using the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty store that reads time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Makes subsequent `acquire` calls fail with a store error.
    pub fn set_fail_on_acquire(&self, fail: bool) {
        self.faults.fail_on_acquire.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `finalize` calls fail with a store error.
    pub fn set_fail_on_finalize(&self, fail: bool) {
        self.faults.fail_on_finalize.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `release_slot` calls fail with a store error.
    pub fn set_fail_on_release_slot(&self, fail: bool) {
        self.faults.fail_on_release_slot.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of lock rows, live or expired.
    pub async fn lock_row_count(&self) -> usize {
        self.state.lock().await.locks.len()
    }

    fn injected(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AvailabilityError::Unavailable(format!("{op} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl LockManager for InMemorySlotStore {
    async fn acquire(
        &self,
        slot_id: SlotId,
        holder: UserId,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        validate_ttl(ttl)?;
        Self::injected(&self.faults.fail_on_acquire, "acquire")?;

        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let slot = state
            .slots
            .get(&slot_id)
            .ok_or(AvailabilityError::SlotNotFound(slot_id))?;

        let renewed = match check_acquire(
            slot.available,
            slot.booked,
            state.locks.get(&slot_id),
            holder,
            now,
        ) {
            Ok(renewed) => renewed,
            Err(reason) => {
                metrics::counter!("slot_lock_conflicts_total").increment(1);
                return Ok(AcquireOutcome::Conflict(reason));
            }
        };

        let lock = SlotLock {
            slot_id,
            holder,
            locked_at: now,
            expires_at: now + ttl,
        };
        let expires_at = lock.expires_at;
        state.locks.insert(slot_id, lock);
        metrics::counter!("slot_lock_acquired_total").increment(1);

        Ok(AcquireOutcome::Granted(LockGrant {
            slot_id,
            holder,
            expires_at,
            renewed,
        }))
    }

    async fn release(&self, slot_id: SlotId, holder: UserId) -> Result<ReleaseOutcome> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        match state.locks.get(&slot_id) {
            Some(lock) if lock.holder == holder && lock.is_live(now) => {
                state.locks.remove(&slot_id);
                Ok(ReleaseOutcome::Released)
            }
            _ => Ok(ReleaseOutcome::NotFound),
        }
    }

    async fn current_lock(&self, slot_id: SlotId) -> Result<Option<SlotLock>> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        Ok(state
            .locks
            .get(&slot_id)
            .filter(|lock| lock.is_live(now))
            .cloned())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let before = state.locks.len();
        state.locks.retain(|_, lock| lock.is_live(now));
        Ok((before - state.locks.len()) as u64)
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    async fn get_available(&self, query: SlotQuery) -> Result<Vec<Slot>> {
        let state = self.state.lock().await;
        let now = self.clock.now();
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|slot| query.matches(slot) && slot.is_open())
            .filter(|slot| {
                !state
                    .locks
                    .get(&slot.id)
                    .is_some_and(|lock| lock.is_live(now))
            })
            .cloned()
            .collect();
        slots.sort_by_key(|slot| (slot.time, slot.id));
        Ok(slots)
    }

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        Ok(self.state.lock().await.slots.get(&slot_id).cloned())
    }

    async fn finalize(&self, slot_id: SlotId, booking_id: BookingId) -> Result<FinalizeOutcome> {
        Self::injected(&self.faults.fail_on_finalize, "finalize")?;

        let mut state = self.state.lock().await;
        let Some(slot) = state.slots.get_mut(&slot_id) else {
            return Ok(FinalizeOutcome::NotFound);
        };
        if slot.booked {
            return Ok(FinalizeOutcome::AlreadyBooked {
                booking_id: slot.booking_id,
            });
        }

        slot.booked = true;
        slot.booking_id = Some(booking_id);
        state.locks.remove(&slot_id);
        Ok(FinalizeOutcome::Finalized)
    }

    async fn release_slot(&self, slot_id: SlotId, booking_id: BookingId) -> Result<SlotRelease> {
        Self::injected(&self.faults.fail_on_release_slot, "release_slot")?;

        let mut state = self.state.lock().await;
        match state.slots.get_mut(&slot_id) {
            Some(slot) if slot.booked && slot.booking_id == Some(booking_id) => {
                slot.booked = false;
                slot.booking_id = None;
                Ok(SlotRelease::Released)
            }
            _ => Ok(SlotRelease::NotHeld),
        }
    }

    async fn import_slots(&self, slots: Vec<Slot>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut written = 0;
        for slot in slots {
            if state.slots.get(&slot.id).is_some_and(|s| s.booked) {
                continue;
            }
            // Ownership only ever changes through finalize/release_slot.
            let slot = Slot {
                booked: false,
                booking_id: None,
                ..slot
            };
            state.slots.insert(slot.id, slot);
            written += 1;
        }
        Ok(written)
    }
}
