//! Booking saga coordinator.
//!
//! Drives a booking through lock → validate → price → record → finalize →
//! confirm. Each step that acquires a resource pushes the matching undo
//! action; on failure the actions run in reverse so the lock is always the
//! last thing released.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use availability::{AcquireOutcome, FinalizeOutcome, LockManager, ReleaseOutcome, SlotStore};
use common::{
    BookingId, Clock, Identity, Money, SagaId, SalonId, ServiceId, SlotId, SystemClock, UserId,
};
use futures_util::future::join_all;
use ledger::{Booking, BookingItem, BookingLedger, BookingStatus, NewBooking};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::aggregate::SagaInstance;
use crate::config::SagaConfig;
use crate::error::{BookingError, Result};
use crate::events::SagaEvent;
use crate::log::SagaLog;
use crate::services::{Catalog, Notification, NotificationSink};
use crate::steps;

/// Request to book a slot for the calling customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBooking {
    pub salon_id: SalonId,
    pub slot_id: SlotId,
    pub service_ids: Vec<ServiceId>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateBooking {
    pub fn new(salon_id: SalonId, slot_id: SlotId, service_ids: Vec<ServiceId>) -> Self {
        Self {
            salon_id,
            slot_id,
            service_ids,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Rejects requests that could never produce a valid booking.
    pub fn validate(&self) -> Result<()> {
        if self.service_ids.is_empty() {
            return Err(BookingError::InvalidRequest(
                "at least one service is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for id in &self.service_ids {
            if !seen.insert(id) {
                return Err(BookingError::InvalidRequest(format!(
                    "service {id} requested more than once"
                )));
            }
        }
        Ok(())
    }
}

/// Undo action for a resource the saga holds.
#[derive(Debug, Clone, Copy)]
enum Compensation {
    ReleaseLock { slot_id: SlotId, holder: UserId },
    CancelBooking { booking_id: BookingId },
    ReleaseSlot { slot_id: SlotId, booking_id: BookingId },
}

impl Compensation {
    fn step_name(&self) -> &'static str {
        match self {
            Compensation::ReleaseLock { .. } => steps::COMPENSATE_RELEASE_LOCK,
            Compensation::CancelBooking { .. } => steps::COMPENSATE_CANCEL_BOOKING,
            Compensation::ReleaseSlot { .. } => steps::COMPENSATE_RELEASE_SLOT,
        }
    }
}

struct StepFailure {
    step: &'static str,
    error: BookingError,
}

impl StepFailure {
    fn new(step: &'static str, error: impl Into<BookingError>) -> Self {
        Self {
            step,
            error: error.into(),
        }
    }
}

/// Per-execution saga state: the in-memory instance plus the undo stack.
struct SagaRun {
    id: SagaId,
    instance: SagaInstance,
    compensations: Vec<Compensation>,
}

/// Orchestrates booking sagas and booking cancellation.
///
/// Collaborators are trait objects so the same coordinator runs against
/// PostgreSQL or in-memory stores chosen at startup.
#[derive(Clone)]
pub struct BookingCoordinator {
    pub(crate) slots: Arc<dyn SlotStore>,
    pub(crate) locks: Arc<dyn LockManager>,
    pub(crate) ledger: Arc<dyn BookingLedger>,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) notifier: Arc<dyn NotificationSink>,
    pub(crate) log: Arc<dyn SagaLog>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SagaConfig,
}

impl BookingCoordinator {
    /// Creates a coordinator with the default configuration and system clock.
    pub fn new(
        slots: Arc<dyn SlotStore>,
        locks: Arc<dyn LockManager>,
        ledger: Arc<dyn BookingLedger>,
        catalog: Arc<dyn Catalog>,
        notifier: Arc<dyn NotificationSink>,
        log: Arc<dyn SagaLog>,
    ) -> Self {
        Self {
            slots,
            locks,
            ledger,
            catalog,
            notifier,
            log,
            clock: Arc::new(SystemClock),
            config: SagaConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `clock` for saga log timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Books a slot for the calling customer.
    ///
    /// Returns the `CONFIRMED` booking, or exactly one error after every
    /// acquired resource has been compensated.
    #[tracing::instrument(
        skip(self, identity, request),
        fields(customer_id = %identity.user_id, slot_id = %request.slot_id, saga_id = tracing::field::Empty)
    )]
    pub async fn create_booking(
        &self,
        identity: &Identity,
        request: CreateBooking,
    ) -> Result<Booking> {
        request.validate()?;

        let customer_id = identity.user_id;
        // The saga shares its id with the booking it creates.
        let booking_id = BookingId::new();
        let saga_id = SagaId::from_uuid(booking_id.as_uuid());
        tracing::Span::current().record("saga_id", tracing::field::display(saga_id));
        metrics::counter!("booking_saga_started_total").increment(1);
        let saga_start = Instant::now();

        let mut run = SagaRun {
            id: saga_id,
            instance: SagaInstance::default(),
            compensations: Vec::new(),
        };
        let started = SagaEvent::saga_started(
            saga_id,
            customer_id,
            request.salon_id,
            request.slot_id,
            request.service_ids.clone(),
            self.clock.now(),
        );
        self.record(&mut run, started).await;
        info!("booking saga started");

        match self
            .run_steps(&mut run, booking_id, customer_id, &request)
            .await
        {
            Ok(booking) => {
                let duration = saga_start.elapsed().as_secs_f64();
                metrics::histogram!("booking_saga_duration_seconds").record(duration);
                metrics::counter!("booking_saga_confirmed_total").increment(1);
                info!(booking_id = %booking.id, duration, "booking confirmed");

                self.after_confirm(customer_id, &booking).await;
                Ok(booking)
            }
            Err(failure) => {
                let kind = failure.error.kind();
                warn!(
                    step = failure.step,
                    kind = %kind,
                    error = %failure.error,
                    "booking saga step failed"
                );
                let failed = SagaEvent::step_failed(failure.step, kind, failure.error.to_string());
                self.record(&mut run, failed).await;

                self.compensate(&mut run).await;

                let saga_failed =
                    SagaEvent::saga_failed(kind, failure.error.to_string(), self.clock.now());
                self.record(&mut run, saga_failed).await;

                metrics::histogram!("booking_saga_duration_seconds")
                    .record(saga_start.elapsed().as_secs_f64());
                metrics::counter!("booking_saga_failed_total", "kind" => kind.as_str())
                    .increment(1);
                Err(failure.error)
            }
        }
    }

    async fn run_steps(
        &self,
        run: &mut SagaRun,
        booking_id: BookingId,
        customer_id: UserId,
        request: &CreateBooking,
    ) -> std::result::Result<Booking, StepFailure> {
        let slot_id = request.slot_id;

        // STARTED -> LOCKED
        let grant = match self
            .locks
            .acquire(slot_id, customer_id, self.config.lock_ttl)
            .await
            .map_err(|e| StepFailure::new(steps::STEP_ACQUIRE_LOCK, e))?
        {
            AcquireOutcome::Granted(grant) => grant,
            AcquireOutcome::Conflict(reason) => {
                return Err(StepFailure::new(
                    steps::STEP_ACQUIRE_LOCK,
                    BookingError::SlotUnavailable(reason.to_string()),
                ));
            }
        };
        run.compensations.push(Compensation::ReleaseLock {
            slot_id,
            holder: customer_id,
        });
        self.record(run, SagaEvent::lock_acquired(grant.expires_at))
            .await;

        // Slot must exist and belong to the requested salon
        let slot = self
            .slots
            .get_slot(slot_id)
            .await
            .map_err(|e| StepFailure::new(steps::STEP_VALIDATE_SLOT, e))?
            .ok_or_else(|| {
                StepFailure::new(steps::STEP_VALIDATE_SLOT, BookingError::SlotNotFound(slot_id))
            })?;
        if slot.salon_id != request.salon_id {
            return Err(StepFailure::new(
                steps::STEP_VALIDATE_SLOT,
                BookingError::InvalidRequest(format!(
                    "slot {slot_id} does not belong to salon {}",
                    request.salon_id
                )),
            ));
        }

        // LOCKED -> PRICED
        let items = self
            .price_services(request.salon_id, &request.service_ids)
            .await
            .map_err(|e| StepFailure::new(steps::STEP_PRICE_SERVICES, e))?;
        self.record(run, SagaEvent::services_priced(items.clone()))
            .await;

        // PRICED -> LEDGER_PENDING
        let new_booking = NewBooking {
            id: booking_id,
            customer_id,
            salon_id: request.salon_id,
            slot_id,
            booking_date: slot.date,
            booking_time: slot.time,
            notes: request.notes.clone(),
            items,
        };
        self.record_pending(new_booking)
            .await
            .map_err(|e| StepFailure::new(steps::STEP_RECORD_BOOKING, e))?;
        run.compensations
            .push(Compensation::CancelBooking { booking_id });
        self.record(run, SagaEvent::booking_recorded(booking_id))
            .await;

        // LEDGER_PENDING -> SLOT_FINALIZED
        match self
            .slots
            .finalize(slot_id, booking_id)
            .await
            .map_err(|e| StepFailure::new(steps::STEP_FINALIZE_SLOT, e))?
        {
            FinalizeOutcome::Finalized => {}
            FinalizeOutcome::AlreadyBooked { booking_id: owner } => {
                warn!(?owner, "slot finalized by another booking while locked");
                return Err(StepFailure::new(
                    steps::STEP_FINALIZE_SLOT,
                    BookingError::SlotUnavailable("slot is already booked".to_string()),
                ));
            }
            FinalizeOutcome::NotFound => {
                return Err(StepFailure::new(
                    steps::STEP_FINALIZE_SLOT,
                    BookingError::SlotNotFound(slot_id),
                ));
            }
        }
        run.compensations.push(Compensation::ReleaseSlot {
            slot_id,
            booking_id,
        });
        self.record(run, SagaEvent::slot_finalized(booking_id))
            .await;

        // SLOT_FINALIZED -> CONFIRMED
        let confirmed = self
            .transition(booking_id, BookingStatus::Confirmed)
            .await
            .map_err(|e| StepFailure::new(steps::STEP_CONFIRM_BOOKING, e))?;
        self.record(
            run,
            SagaEvent::booking_confirmed(booking_id, self.clock.now()),
        )
        .await;

        Ok(confirmed)
    }

    /// Resolves every service concurrently, preserving request order.
    async fn price_services(
        &self,
        salon_id: SalonId,
        service_ids: &[ServiceId],
    ) -> Result<Vec<BookingItem>> {
        let lookups = service_ids
            .iter()
            .map(|&id| async move { (id, self.catalog.get_service(salon_id, id).await) });

        let mut items = Vec::with_capacity(service_ids.len());
        for (service_id, result) in join_all(lookups).await {
            match result {
                Ok(Some(service)) if service.price.is_negative() => {
                    warn!(
                        %service_id,
                        price = %service.price,
                        "catalog returned a negative price"
                    );
                    return Err(BookingError::InvalidRequest(format!(
                        "service {service_id} has an invalid price"
                    )));
                }
                Ok(Some(service)) => items.push(service.to_item()),
                Ok(None) => return Err(BookingError::ServiceNotFound(service_id)),
                Err(e) => {
                    warn!(%service_id, error = %e, "catalog lookup failed");
                    return Err(BookingError::ServiceNotFound(service_id));
                }
            }
        }
        if Money::checked_sum(items.iter().map(|i| i.price)).is_none() {
            return Err(BookingError::InvalidRequest(
                "booking total exceeds the supported amount".to_string(),
            ));
        }
        Ok(items)
    }

    /// Commits the `PENDING` booking in its own transaction.
    async fn record_pending(&self, booking: NewBooking) -> Result<()> {
        let mut tx = self.ledger.begin().await?;
        tx.insert(booking).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Changes a booking's status under an exclusive read.
    pub(crate) async fn transition(
        &self,
        booking_id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking> {
        let mut tx = self.ledger.begin().await?;
        let updated = tx.set_status(booking_id, status).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Runs the undo stack in reverse. Failures are logged and counted, never
    /// raised, so the original error reaches the caller.
    async fn compensate(&self, run: &mut SagaRun) {
        while let Some(compensation) = run.compensations.pop() {
            let step = compensation.step_name();
            let result = match compensation {
                Compensation::ReleaseSlot {
                    slot_id,
                    booking_id,
                } => self
                    .slots
                    .release_slot(slot_id, booking_id)
                    .await
                    .map(|_| ())
                    .map_err(BookingError::from),
                Compensation::CancelBooking { booking_id } => self
                    .transition(booking_id, BookingStatus::Cancelled)
                    .await
                    .map(|_| ()),
                Compensation::ReleaseLock { slot_id, holder } => self
                    .locks
                    .release(slot_id, holder)
                    .await
                    .map(|_| ())
                    .map_err(BookingError::from),
            };

            match result {
                Ok(()) => {
                    debug!(step, "compensation step completed");
                    self.record(run, SagaEvent::compensation_step_completed(step))
                        .await;
                }
                Err(e) => {
                    error!(step, error = %e, "compensation step failed");
                    metrics::counter!("booking_compensation_failures_total", "step" => step)
                        .increment(1);
                    self.record(run, SagaEvent::compensation_step_failed(step, e.to_string()))
                        .await;
                }
            }
        }
    }

    /// Best-effort work after the booking is confirmed.
    async fn after_confirm(&self, customer_id: UserId, booking: &Booking) {
        // Finalize already cleared the lock row; anything left is stale.
        match self.locks.release(booking.slot_id, customer_id).await {
            Ok(ReleaseOutcome::Released) => debug!("slot lock released"),
            Ok(ReleaseOutcome::NotFound) => debug!("slot lock already gone"),
            Err(e) => warn!(error = %e, "failed to release slot lock after confirm"),
        }
        self.send_notification(Notification::booking_confirmed(booking))
            .await;
    }

    /// Delivers a notification within `notify_timeout`, logging any failure.
    pub(crate) async fn send_notification(&self, notification: Notification) {
        let kind = notification.kind;
        match tokio::time::timeout(
            self.config.notify_timeout,
            self.notifier.notify(notification),
        )
        .await
        {
            Ok(Ok(())) => debug!(?kind, "notification sent"),
            Ok(Err(e)) => warn!(?kind, error = %e, "failed to send notification"),
            Err(_) => warn!(?kind, timeout = ?self.config.notify_timeout, "notification timed out"),
        }
    }

    /// Applies an event to the running saga and appends it to the log.
    ///
    /// Log failures are logged only; they never change the booking outcome.
    async fn record(&self, run: &mut SagaRun, event: SagaEvent) {
        if let Err(e) = self.log.append(run.id, &event, self.clock.now()).await {
            warn!(
                saga_id = %run.id,
                event_type = event.event_type(),
                error = %e,
                "failed to append saga event"
            );
        }
        run.instance.apply(event);
        debug!(state = %run.instance.state(), "saga state");
    }
}
