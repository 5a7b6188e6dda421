//! Reconciliation of abandoned `PENDING` bookings.
//!
//! A saga that crashes after recording its booking but before confirming
//! leaves a `PENDING` row behind. The lock expires on its own; this task
//! settles the booking: if the slot was finalized for it the booking is
//! rolled forward to `CONFIRMED`, otherwise it is cancelled.

use std::sync::Arc;

use availability::SlotStore;
use common::{BookingId, Clock, SystemClock};
use ledger::{BookingLedger, BookingStatus};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::Result;

/// Result of one reconciliation cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Bookings rolled forward to `CONFIRMED`.
    pub confirmed: u64,
    /// Bookings marked `CANCELLED`.
    pub cancelled: u64,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.confirmed + self.cancelled
    }
}

/// Periodically settles `PENDING` bookings older than the grace period.
pub struct PendingBookingReconciler {
    config: ReconcilerConfig,
    slots: Arc<dyn SlotStore>,
    ledger: Arc<dyn BookingLedger>,
    clock: Arc<dyn Clock>,
}

impl PendingBookingReconciler {
    pub fn new(
        config: ReconcilerConfig,
        slots: Arc<dyn SlotStore>,
        ledger: Arc<dyn BookingLedger>,
    ) -> Self {
        Self {
            config,
            slots,
            ledger,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one cycle over at most `batch_size` stale bookings.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        let cutoff = self.clock.now() - self.config.pending_grace;
        let stale = self
            .ledger
            .find_stale_pending(cutoff, self.config.batch_size)
            .await?;

        let mut report = ReconcileReport::default();
        for booking in stale {
            match self.settle(booking.id).await {
                Ok(Some(BookingStatus::Confirmed)) => {
                    report.confirmed += 1;
                    metrics::counter!("pending_bookings_reconciled_total", "outcome" => "confirmed")
                        .increment(1);
                    info!(booking_id = %booking.id, "pending booking confirmed");
                }
                Ok(Some(_)) => {
                    report.cancelled += 1;
                    metrics::counter!("pending_bookings_reconciled_total", "outcome" => "cancelled")
                        .increment(1);
                    info!(booking_id = %booking.id, "pending booking cancelled");
                }
                Ok(None) => debug!(booking_id = %booking.id, "booking settled concurrently"),
                Err(e) => {
                    warn!(booking_id = %booking.id, error = %e, "failed to reconcile booking");
                    report.errors.push(format!("{}: {}", booking.id, e));
                }
            }
        }
        Ok(report)
    }

    /// Settles one booking under an exclusive read. `None` if it is no
    /// longer `PENDING`.
    async fn settle(&self, booking_id: BookingId) -> Result<Option<BookingStatus>> {
        let mut tx = self.ledger.begin().await?;
        let Some(current) = tx.get_for_update(booking_id).await? else {
            return Ok(None);
        };
        if current.status != BookingStatus::Pending {
            return Ok(None);
        }

        let finalized = self
            .slots
            .get_slot(current.slot_id)
            .await?
            .is_some_and(|slot| slot.booked && slot.booking_id == Some(booking_id));
        let target = if finalized {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Cancelled
        };

        tx.set_status(booking_id, target).await?;
        tx.commit().await?;
        Ok(Some(target))
    }

    /// Reconciles every `interval` until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("pending booking reconciler disabled");
            return;
        }
        info!(interval = ?self.config.interval, "pending booking reconciler started");

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_once().await {
                        Ok(report) if report.total() > 0 || report.has_errors() => info!(
                            confirmed = report.confirmed,
                            cancelled = report.cancelled,
                            errors = report.errors.len(),
                            "reconciliation cycle finished"
                        ),
                        Ok(_) => debug!("no pending bookings to reconcile"),
                        Err(e) => warn!(error = %e, "reconciliation cycle failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("pending booking reconciler stopped");
    }
}
