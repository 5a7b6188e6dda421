//! Saga and reconciler configuration.

use std::time::Duration;

use availability::default_lock_ttl;

/// Configuration for [`BookingCoordinator`](crate::BookingCoordinator).
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// How long the slot lock is held while a booking is in flight.
    pub lock_ttl: chrono::Duration,
    /// Upper bound on a single notification call.
    pub notify_timeout: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            lock_ttl: default_lock_ttl(),
            notify_timeout: Duration::from_millis(2000),
        }
    }
}

/// Configuration for [`PendingBookingReconciler`](crate::PendingBookingReconciler).
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Interval between reconciliation cycles.
    pub interval: Duration,
    /// A `PENDING` booking older than this is considered abandoned.
    pub pending_grace: chrono::Duration,
    /// Maximum bookings handled per cycle.
    pub batch_size: usize,
    pub enabled: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            pending_grace: chrono::Duration::minutes(15),
            batch_size: 100,
            enabled: true,
        }
    }
}
