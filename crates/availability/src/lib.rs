//! Slot availability and short-lived slot locks.
//!
//! [`SlotStore`] owns the authoritative `booked` flag of each slot;
//! [`LockManager`] grants time-boxed exclusive holds used while a booking
//! saga is in flight.

pub mod error;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod slot;
pub mod store;
pub mod sweeper;

pub use error::{AvailabilityError, Result};
pub use lock::{
    AcquireOutcome, ConflictReason, DEFAULT_LOCK_TTL_SECS, LockGrant, ReleaseOutcome, SlotLock,
    default_lock_ttl,
};
pub use memory::InMemorySlotStore;
pub use postgres::PostgresSlotStore;
pub use slot::{FinalizeOutcome, Slot, SlotQuery, SlotRelease};
pub use store::{LockManager, SlotStore};
pub use sweeper::{LockSweeper, LockSweeperConfig};
