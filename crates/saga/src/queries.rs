//! Read-side operations: bookings and saga records.

use chrono::{DateTime, Utc};
use common::{BookingId, Identity, SagaId, SalonId};
use ledger::{Booking, BookingStatus, SalonBookingFilter};

use crate::aggregate::SagaInstance;
use crate::coordinator::BookingCoordinator;
use crate::error::{BookingError, Result};

impl BookingCoordinator {
    /// Gets one booking visible to `identity`.
    pub async fn get_booking(&self, identity: &Identity, booking_id: BookingId) -> Result<Booking> {
        let booking = self
            .ledger
            .get(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        if !identity.may_act_for(booking.customer_id) {
            return Err(BookingError::Unauthorized(
                "booking belongs to another customer".to_string(),
            ));
        }
        Ok(booking)
    }

    /// Lists the caller's own bookings, newest first.
    pub async fn list_customer_bookings(
        &self,
        identity: &Identity,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>> {
        Ok(self
            .ledger
            .list_for_customer(identity.user_id, status)
            .await?)
    }

    /// Lists a salon's bookings. Salon owners and admins only.
    pub async fn list_salon_bookings(
        &self,
        identity: &Identity,
        salon_id: SalonId,
        filter: SalonBookingFilter,
    ) -> Result<Vec<Booking>> {
        if !identity.can_manage_bookings() {
            return Err(BookingError::Unauthorized(
                "salon bookings are visible to salon owners and admins".to_string(),
            ));
        }
        Ok(self.ledger.list_for_salon(salon_id, filter).await?)
    }

    /// Rebuilds a saga record from the log.
    pub async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let events = self.log.load(saga_id).await?;
        Ok(SagaInstance::replay(events))
    }

    /// Sagas started before `older_than` that never finished.
    pub async fn stuck_sagas(&self, older_than: DateTime<Utc>) -> Result<Vec<SagaId>> {
        Ok(self.log.stuck_sagas(older_than).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use availability::{InMemorySlotStore, Slot, SlotStore};
    use chrono::{NaiveDate, NaiveTime};
    use common::{Clock, ManualClock, Money, Role, ServiceId, UserId};
    use ledger::InMemoryBookingLedger;

    use super::*;
    use crate::coordinator::CreateBooking;
    use crate::error::ErrorKind;
    use crate::events::SagaEvent;
    use crate::log::{InMemorySagaLog, SagaLog};
    use crate::services::{InMemoryCatalog, InMemoryNotificationSink, ServiceInfo};
    use crate::state::SagaState;

    struct Fixture {
        coordinator: BookingCoordinator,
        log: InMemorySagaLog,
        clock: ManualClock,
        salon: SalonId,
        customer: Identity,
        booking: Booking,
    }

    async fn setup() -> Fixture {
        let clock = ManualClock::new(Utc::now());
        let slots = InMemorySlotStore::new();
        let catalog = InMemoryCatalog::new();
        let log = InMemorySagaLog::new();

        let salon = SalonId::new();
        let service = ServiceInfo::new(ServiceId::new(), "Color", Money::from_dollars(90), 60);
        catalog.add_service(salon, service.clone()).await;
        let slot = Slot::open(
            salon,
            service.id,
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            60,
        );
        slots.import_slots(vec![slot.clone()]).await.unwrap();

        let coordinator = BookingCoordinator::new(
            Arc::new(slots.clone()),
            Arc::new(slots),
            Arc::new(InMemoryBookingLedger::new()),
            Arc::new(catalog),
            Arc::new(InMemoryNotificationSink::new()),
            Arc::new(log.clone()),
        )
        .with_clock(Arc::new(clock.clone()));

        let customer = Identity::customer(UserId::new());
        let booking = coordinator
            .create_booking(&customer, CreateBooking::new(salon, slot.id, vec![service.id]))
            .await
            .unwrap();

        Fixture {
            coordinator,
            log,
            clock,
            salon,
            customer,
            booking,
        }
    }

    #[tokio::test]
    async fn test_get_booking_visibility() {
        let f = setup().await;

        let own = f.coordinator.get_booking(&f.customer, f.booking.id).await.unwrap();
        assert_eq!(own.id, f.booking.id);

        let admin = Identity::new(UserId::new(), Role::Admin);
        assert!(f.coordinator.get_booking(&admin, f.booking.id).await.is_ok());

        let stranger = Identity::customer(UserId::new());
        let err = f
            .coordinator
            .get_booking(&stranger, f.booking.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = f
            .coordinator
            .get_booking(&f.customer, BookingId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BookingNotFound);
    }

    #[tokio::test]
    async fn test_listings() {
        let f = setup().await;

        let mine = f
            .coordinator
            .list_customer_bookings(&f.customer, Some(BookingStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert!(
            f.coordinator
                .list_customer_bookings(&f.customer, Some(BookingStatus::Pending))
                .await
                .unwrap()
                .is_empty()
        );

        let err = f
            .coordinator
            .list_salon_bookings(&f.customer, f.salon, SalonBookingFilter::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let owner = Identity::new(UserId::new(), Role::SalonOwner);
        let salon_bookings = f
            .coordinator
            .list_salon_bookings(&owner, f.salon, SalonBookingFilter::default())
            .await
            .unwrap();
        assert_eq!(salon_bookings.len(), 1);
    }

    #[tokio::test]
    async fn test_get_saga_and_stuck_sagas() {
        let f = setup().await;

        let saga = f
            .coordinator
            .get_saga(SagaId::from_uuid(f.booking.id.as_uuid()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saga.state(), SagaState::Confirmed);
        assert_eq!(saga.total_amount(), Some(Money::from_dollars(90)));
        assert!(f.coordinator.get_saga(SagaId::new()).await.unwrap().is_none());

        // A saga that crashed after recording its booking.
        let crashed = SagaId::new();
        let now = f.clock.now();
        f.log
            .append(
                crashed,
                &SagaEvent::saga_started(
                    crashed,
                    f.customer.user_id,
                    f.salon,
                    f.booking.slot_id,
                    vec![],
                    now,
                ),
                now,
            )
            .await
            .unwrap();

        f.clock.advance(chrono::Duration::minutes(30));
        let stuck = f
            .coordinator
            .stuck_sagas(f.clock.now() - chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(stuck, vec![crashed]);
    }
}
