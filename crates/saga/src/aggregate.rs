//! Saga instance aggregate.

use chrono::{DateTime, Utc};
use common::{BookingId, Money, SagaId, SalonId, ServiceId, SlotId, UserId};
use ledger::BookingItem;
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::events::SagaEvent;
use crate::state::SagaState;

/// Outcome of one compensation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub step_name: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// A booking saga rebuilt from its events.
///
/// This is the state-tagged record recovery tooling inspects: it shows how
/// far the saga got, which resources it acquired and what was undone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SagaInstance {
    id: Option<SagaId>,
    saga_type: String,
    state: SagaState,
    customer_id: Option<UserId>,
    salon_id: Option<SalonId>,
    slot_id: Option<SlotId>,
    service_ids: Vec<ServiceId>,
    started_at: Option<DateTime<Utc>>,
    lock_expires_at: Option<DateTime<Utc>>,
    items: Vec<BookingItem>,
    total_amount: Option<Money>,
    booking_id: Option<BookingId>,
    failed_step: Option<String>,
    failure_kind: Option<ErrorKind>,
    failure_reason: Option<String>,
    compensations: Vec<CompensationRecord>,
    finished_at: Option<DateTime<Utc>>,
}

impl SagaInstance {
    /// Rebuilds a saga from its events; `None` if there are none.
    pub fn replay(events: impl IntoIterator<Item = SagaEvent>) -> Option<Self> {
        let mut saga = SagaInstance::default();
        let mut any = false;
        for event in events {
            saga.apply(event);
            any = true;
        }
        any.then_some(saga)
    }

    pub fn apply(&mut self, event: SagaEvent) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.saga_type = data.saga_type;
                self.customer_id = Some(data.customer_id);
                self.salon_id = Some(data.salon_id);
                self.slot_id = Some(data.slot_id);
                self.service_ids = data.service_ids;
                self.started_at = Some(data.started_at);
                self.state = SagaState::Started;
            }
            SagaEvent::LockAcquired(data) => {
                self.lock_expires_at = Some(data.expires_at);
                self.state = SagaState::Locked;
            }
            SagaEvent::ServicesPriced(data) => {
                self.items = data.items;
                self.total_amount = Some(data.total_amount);
                self.state = SagaState::Priced;
            }
            SagaEvent::BookingRecorded(data) => {
                self.booking_id = Some(data.booking_id);
                self.state = SagaState::LedgerPending;
            }
            SagaEvent::SlotFinalized(_) => {
                self.state = SagaState::SlotFinalized;
            }
            SagaEvent::BookingConfirmed(data) => {
                self.finished_at = Some(data.confirmed_at);
                self.state = SagaState::Confirmed;
            }
            SagaEvent::StepFailed(data) => {
                self.failed_step = Some(data.step_name);
                self.failure_kind = Some(data.kind);
                self.failure_reason = Some(data.error);
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(data) => {
                self.compensations.push(CompensationRecord {
                    step_name: data.step_name,
                    succeeded: true,
                    error: None,
                });
            }
            SagaEvent::CompensationStepFailed(data) => {
                self.compensations.push(CompensationRecord {
                    step_name: data.step_name,
                    succeeded: false,
                    error: Some(data.error),
                });
            }
            SagaEvent::SagaFailed(data) => {
                self.failure_kind = Some(data.kind);
                if self.failure_reason.is_none() {
                    self.failure_reason = Some(data.reason);
                }
                self.finished_at = Some(data.failed_at);
                self.state = SagaState::Failed;
            }
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn id(&self) -> Option<SagaId> {
        self.id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn customer_id(&self) -> Option<UserId> {
        self.customer_id
    }

    pub fn slot_id(&self) -> Option<SlotId> {
        self.slot_id
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        self.booking_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn lock_expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock_expires_at
    }

    /// Price snapshot taken by the pricing step.
    pub fn items(&self) -> &[BookingItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Option<Money> {
        self.total_amount
    }

    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure_kind
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Compensation steps in the order they ran.
    pub fn compensations(&self) -> &[CompensationRecord] {
        &self.compensations
    }

    /// Returns true if any compensation step failed, leaving work for an operator.
    pub fn needs_attention(&self) -> bool {
        self.compensations.iter().any(|c| !c.succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps;

    fn started(saga_id: SagaId) -> SagaEvent {
        SagaEvent::saga_started(
            saga_id,
            UserId::new(),
            SalonId::new(),
            SlotId::new(),
            vec![ServiceId::new()],
            Utc::now(),
        )
    }

    #[test]
    fn test_replay_empty_is_none() {
        assert!(SagaInstance::replay(Vec::new()).is_none());
    }

    #[test]
    fn test_success_path() {
        let saga_id = SagaId::new();
        let booking_id = BookingId::new();
        let now = Utc::now();
        let item = BookingItem {
            service_id: ServiceId::new(),
            service_name: "Cut".to_string(),
            price: Money::from_dollars(50),
            duration_minutes: 30,
        };

        let saga = SagaInstance::replay(vec![
            started(saga_id),
            SagaEvent::lock_acquired(now),
            SagaEvent::services_priced(vec![item.clone()]),
            SagaEvent::booking_recorded(booking_id),
            SagaEvent::slot_finalized(booking_id),
            SagaEvent::booking_confirmed(booking_id, now),
        ])
        .unwrap();

        assert_eq!(saga.id(), Some(saga_id));
        assert_eq!(saga.saga_type(), steps::SAGA_TYPE);
        assert_eq!(saga.state(), SagaState::Confirmed);
        assert_eq!(saga.booking_id(), Some(booking_id));
        assert_eq!(saga.items(), &[item]);
        assert_eq!(saga.total_amount(), Some(Money::from_dollars(50)));
        assert!(saga.compensations().is_empty());
    }

    #[test]
    fn test_failure_with_compensation() {
        let saga_id = SagaId::new();
        let booking_id = BookingId::new();
        let now = Utc::now();

        let mut saga = SagaInstance::default();
        for event in [
            started(saga_id),
            SagaEvent::lock_acquired(now),
            SagaEvent::services_priced(Vec::new()),
            SagaEvent::booking_recorded(booking_id),
        ] {
            saga.apply(event);
        }
        assert_eq!(saga.state(), SagaState::LedgerPending);

        saga.apply(SagaEvent::step_failed(
            steps::STEP_FINALIZE_SLOT,
            ErrorKind::SlotUnavailable,
            "already booked",
        ));
        assert_eq!(saga.state(), SagaState::Compensating);

        saga.apply(SagaEvent::compensation_step_completed(
            steps::COMPENSATE_CANCEL_BOOKING,
        ));
        saga.apply(SagaEvent::compensation_step_failed(
            steps::COMPENSATE_RELEASE_LOCK,
            "store down",
        ));
        saga.apply(SagaEvent::saga_failed(
            ErrorKind::SlotUnavailable,
            "already booked",
            now,
        ));

        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.failed_step(), Some(steps::STEP_FINALIZE_SLOT));
        assert_eq!(saga.failure_kind(), Some(ErrorKind::SlotUnavailable));
        assert_eq!(saga.compensations().len(), 2);
        assert!(saga.compensations()[0].succeeded);
        assert!(saga.needs_attention());
    }
}
