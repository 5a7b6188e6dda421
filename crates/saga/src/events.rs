//! Saga domain events.

use chrono::{DateTime, Utc};
use common::{BookingId, Money, SagaId, SalonId, ServiceId, SlotId, UserId};
use ledger::BookingItem;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Events recorded while a booking saga runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    /// Saga execution started.
    SagaStarted(SagaStartedData),

    /// The slot lock was granted.
    LockAcquired(LockAcquiredData),

    /// Every requested service was priced.
    ServicesPriced(ServicesPricedData),

    /// The `PENDING` booking was committed.
    BookingRecorded(BookingRefData),

    /// The slot was marked booked by the booking.
    SlotFinalized(BookingRefData),

    /// The booking was confirmed; the saga succeeded.
    BookingConfirmed(BookingConfirmedData),

    /// A forward step failed.
    StepFailed(StepFailedData),

    /// A compensation step completed successfully.
    CompensationStepCompleted(StepData),

    /// A compensation step failed (logged, compensation continues).
    CompensationStepFailed(CompensationFailedData),

    /// Saga failed after compensation.
    SagaFailed(SagaFailedData),
}

impl SagaEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::LockAcquired(_) => "LockAcquired",
            SagaEvent::ServicesPriced(_) => "ServicesPriced",
            SagaEvent::BookingRecorded(_) => "BookingRecorded",
            SagaEvent::SlotFinalized(_) => "SlotFinalized",
            SagaEvent::BookingConfirmed(_) => "BookingConfirmed",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }

    /// Returns true for events that end a saga.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaEvent::BookingConfirmed(_) | SagaEvent::SagaFailed(_)
        )
    }
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: SagaId,
    pub saga_type: String,
    pub customer_id: UserId,
    pub salon_id: SalonId,
    pub slot_id: SlotId,
    pub service_ids: Vec<ServiceId>,
    pub started_at: DateTime<Utc>,
}

/// Data for LockAcquired event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockAcquiredData {
    pub expires_at: DateTime<Utc>,
}

/// Data for ServicesPriced event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesPricedData {
    pub items: Vec<BookingItem>,
    pub total_amount: Money,
}

/// Data for events that only reference the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRefData {
    pub booking_id: BookingId,
}

/// Data for BookingConfirmed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmedData {
    pub booking_id: BookingId,
    pub confirmed_at: DateTime<Utc>,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailedData {
    /// The step that failed.
    pub step_name: String,
    pub kind: ErrorKind,
    /// Error message describing the failure.
    pub error: String,
}

/// Data for CompensationStepCompleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepData {
    pub step_name: String,
}

/// Data for CompensationStepFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationFailedData {
    pub step_name: String,
    pub error: String,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaFailedData {
    pub kind: ErrorKind,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl SagaEvent {
    pub fn saga_started(
        saga_id: SagaId,
        customer_id: UserId,
        salon_id: SalonId,
        slot_id: SlotId,
        service_ids: Vec<ServiceId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            saga_type: crate::steps::SAGA_TYPE.to_string(),
            customer_id,
            salon_id,
            slot_id,
            service_ids,
            started_at,
        })
    }

    pub fn lock_acquired(expires_at: DateTime<Utc>) -> Self {
        SagaEvent::LockAcquired(LockAcquiredData { expires_at })
    }

    pub fn services_priced(items: Vec<BookingItem>) -> Self {
        let total_amount = items.iter().map(|i| i.price).sum();
        SagaEvent::ServicesPriced(ServicesPricedData {
            items,
            total_amount,
        })
    }

    pub fn booking_recorded(booking_id: BookingId) -> Self {
        SagaEvent::BookingRecorded(BookingRefData { booking_id })
    }

    pub fn slot_finalized(booking_id: BookingId) -> Self {
        SagaEvent::SlotFinalized(BookingRefData { booking_id })
    }

    pub fn booking_confirmed(booking_id: BookingId, confirmed_at: DateTime<Utc>) -> Self {
        SagaEvent::BookingConfirmed(BookingConfirmedData {
            booking_id,
            confirmed_at,
        })
    }

    pub fn step_failed(
        step_name: impl Into<String>,
        kind: ErrorKind,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            kind,
            error: error.into(),
        })
    }

    pub fn compensation_step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn compensation_step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationStepFailed(CompensationFailedData {
            step_name: step_name.into(),
            error: error.into(),
        })
    }

    pub fn saga_failed(
        kind: ErrorKind,
        reason: impl Into<String>,
        failed_at: DateTime<Utc>,
    ) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            kind,
            reason: reason.into(),
            failed_at,
        })
    }
}
