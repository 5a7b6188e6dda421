//! Slot lock types.

use chrono::{DateTime, Duration, Utc};
use common::{SlotId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{AvailabilityError, Result};

/// Default hold on a slot while a booking is in flight, in seconds.
pub const DEFAULT_LOCK_TTL_SECS: i64 = 5 * 60;

/// Default hold on a slot while a booking is in flight.
pub fn default_lock_ttl() -> Duration {
    Duration::seconds(DEFAULT_LOCK_TTL_SECS)
}

/// A short-lived exclusive hold on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLock {
    pub slot_id: SlotId,
    pub holder: UserId,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SlotLock {
    /// A lock is live strictly before its expiry instant.
    ///
    /// An expired lock is treated as absent whether or not the row has been
    /// purged yet.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Returns true if the lock is live and held by someone other than `holder`.
    pub fn blocks(&self, holder: UserId, now: DateTime<Utc>) -> bool {
        self.is_live(now) && self.holder != holder
    }
}

/// A granted (or renewed) lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockGrant {
    pub slot_id: SlotId,
    pub holder: UserId,
    pub expires_at: DateTime<Utc>,
    /// True when the same holder already had a live lock that was extended.
    pub renewed: bool,
}

/// Why an acquire was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    Booked,
    Unavailable,
    HeldByOther,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::Booked => "slot is already booked",
            ConflictReason::Unavailable => "slot is not available",
            ConflictReason::HeldByOther => "slot is currently locked",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`LockManager::acquire`](crate::LockManager::acquire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted(LockGrant),
    Conflict(ConflictReason),
}

impl AcquireOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AcquireOutcome::Granted(_))
    }
}

/// Outcome of [`LockManager::release`](crate::LockManager::release).
///
/// Both variants are successes: releasing an absent lock is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NotFound,
}

/// Rejects TTLs that would create an already-expired lock.
pub(crate) fn validate_ttl(ttl: Duration) -> Result<()> {
    if ttl <= Duration::zero() {
        return Err(AvailabilityError::InvalidTtl(ttl.num_seconds()));
    }
    Ok(())
}

/// Decides whether `holder` may take the lock given the slot state and the
/// existing lock row. Shared by every store so the rule lives in one place.
pub(crate) fn check_acquire(
    available: bool,
    booked: bool,
    existing: Option<&SlotLock>,
    holder: UserId,
    now: DateTime<Utc>,
) -> std::result::Result<bool, ConflictReason> {
    if booked {
        return Err(ConflictReason::Booked);
    }
    if !available {
        return Err(ConflictReason::Unavailable);
    }
    match existing {
        Some(lock) if lock.blocks(holder, now) => Err(ConflictReason::HeldByOther),
        Some(lock) => Ok(lock.is_live(now)),
        None => Ok(false),
    }
}
