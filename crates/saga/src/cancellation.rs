//! Booking cancellation flow.

use availability::SlotRelease;
use common::{BookingId, Identity};
use ledger::{Booking, BookingStatus};
use tracing::{debug, info, warn};

use crate::coordinator::BookingCoordinator;
use crate::error::{BookingError, Result};
use crate::services::Notification;

impl BookingCoordinator {
    /// Cancels a `PENDING` or `CONFIRMED` booking.
    ///
    /// The status change is made under an exclusive read so concurrent
    /// cancels of the same booking serialize; exactly one wins and the rest
    /// see `AlreadyTerminal`. Slot release and the notification happen after
    /// commit and are best-effort.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id, role = %identity.role))]
    pub async fn cancel_booking(
        &self,
        identity: &Identity,
        booking_id: BookingId,
    ) -> Result<Booking> {
        let mut tx = self.ledger.begin().await?;
        let current = tx
            .get_for_update(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))?;

        // Early returns drop `tx`, which rolls it back.
        if !identity.may_act_for(current.customer_id) {
            return Err(BookingError::Unauthorized(
                "only the booking's customer or a salon manager may cancel it".to_string(),
            ));
        }
        if current.status.is_terminal() {
            return Err(BookingError::AlreadyTerminal {
                booking_id,
                status: current.status,
            });
        }

        let cancelled = tx.set_status(booking_id, BookingStatus::Cancelled).await?;
        tx.commit().await?;

        metrics::counter!("booking_cancellations_total").increment(1);
        info!(slot_id = %cancelled.slot_id, "booking cancelled");

        match self.slots.release_slot(cancelled.slot_id, booking_id).await {
            Ok(SlotRelease::Released) => debug!("slot released"),
            Ok(SlotRelease::NotHeld) => debug!("slot was not held by booking"),
            Err(e) => warn!(error = %e, "failed to release slot after cancellation"),
        }
        self.send_notification(Notification::booking_cancelled(&cancelled))
            .await;

        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use availability::{InMemorySlotStore, Slot, SlotStore};
    use chrono::{NaiveDate, NaiveTime};
    use common::{Money, Role, SalonId, ServiceId, UserId};
    use ledger::{BookingLedger, InMemoryBookingLedger};

    use super::*;
    use crate::coordinator::CreateBooking;
    use crate::error::ErrorKind;
    use crate::log::InMemorySagaLog;
    use crate::services::{
        InMemoryCatalog, InMemoryNotificationSink, NotificationKind, ServiceInfo,
    };

    struct Fixture {
        coordinator: BookingCoordinator,
        slots: InMemorySlotStore,
        ledger: InMemoryBookingLedger,
        notifier: InMemoryNotificationSink,
        customer: Identity,
        booking: Booking,
    }

    async fn confirmed_booking() -> Fixture {
        let slots = InMemorySlotStore::new();
        let ledger = InMemoryBookingLedger::new();
        let catalog = InMemoryCatalog::new();
        let notifier = InMemoryNotificationSink::new();

        let salon = SalonId::new();
        let service = ServiceInfo::new(ServiceId::new(), "Manicure", Money::from_dollars(35), 45);
        catalog.add_service(salon, service.clone()).await;
        let slot = Slot::open(
            salon,
            service.id,
            NaiveDate::from_ymd_opt(2026, 4, 2).unwrap(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            45,
        );
        slots.import_slots(vec![slot.clone()]).await.unwrap();

        let coordinator = BookingCoordinator::new(
            Arc::new(slots.clone()),
            Arc::new(slots.clone()),
            Arc::new(ledger.clone()),
            Arc::new(catalog),
            Arc::new(notifier.clone()),
            Arc::new(InMemorySagaLog::new()),
        );
        let customer = Identity::customer(UserId::new());
        let booking = coordinator
            .create_booking(&customer, CreateBooking::new(salon, slot.id, vec![service.id]))
            .await
            .unwrap();

        Fixture {
            coordinator,
            slots,
            ledger,
            notifier,
            customer,
            booking,
        }
    }

    #[tokio::test]
    async fn test_owner_cancels_and_slot_is_released() {
        let f = confirmed_booking().await;

        let cancelled = f
            .coordinator
            .cancel_booking(&f.customer, f.booking.id)
            .await
            .unwrap();

        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        let slot = f.slots.get_slot(f.booking.slot_id).await.unwrap().unwrap();
        assert!(!slot.booked);
        assert_eq!(slot.booking_id, None);

        let sent = f.notifier.sent().await;
        assert_eq!(sent.last().unwrap().kind, NotificationKind::BookingCancelled);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let f = confirmed_booking().await;
        f.coordinator
            .cancel_booking(&f.customer, f.booking.id)
            .await
            .unwrap();

        // Someone else books the freed slot; a repeated cancel must not free it.
        let other = BookingId::new();
        f.slots.finalize(f.booking.slot_id, other).await.unwrap();

        let err = f
            .coordinator
            .cancel_booking(&f.customer, f.booking.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::AlreadyTerminal { status: BookingStatus::Cancelled, .. }
        ));

        let slot = f.slots.get_slot(f.booking.slot_id).await.unwrap().unwrap();
        assert_eq!(slot.booking_id, Some(other));
    }

    #[tokio::test]
    async fn test_stranger_is_unauthorized() {
        let f = confirmed_booking().await;
        let stranger = Identity::customer(UserId::new());

        let err = f
            .coordinator
            .cancel_booking(&stranger, f.booking.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let stored = f.ledger.get(f.booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_salon_owner_may_cancel() {
        let f = confirmed_booking().await;
        let owner = Identity::new(UserId::new(), Role::SalonOwner);

        let cancelled = f.coordinator.cancel_booking(&owner, f.booking.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let f = confirmed_booking().await;
        let err = f
            .coordinator
            .cancel_booking(&f.customer, BookingId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BookingNotFound);
    }

    #[tokio::test]
    async fn test_slot_release_failure_keeps_cancellation() {
        let f = confirmed_booking().await;
        f.slots.set_fail_on_release_slot(true);

        let cancelled = f
            .coordinator
            .cancel_booking(&f.customer, f.booking.id)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(f.slots.get_slot(f.booking.slot_id).await.unwrap().unwrap().booked);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_persistence_error() {
        let f = confirmed_booking().await;
        f.ledger.set_fail_on_cancel(true);

        let err = f
            .coordinator
            .cancel_booking(&f.customer, f.booking.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PersistenceError);
        assert!(f.slots.get_slot(f.booking.slot_id).await.unwrap().unwrap().booked);
    }
}
