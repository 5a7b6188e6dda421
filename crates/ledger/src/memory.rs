use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, Clock, SalonId, SystemClock, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Booking, BookingStatus, LedgerError, NewBooking, Result, SalonBookingFilter,
    store::{BookingLedger, LedgerTransaction},
};

#[derive(Debug, Default)]
struct LedgerState {
    bookings: HashMap<BookingId, Booking>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_insert: AtomicBool,
    fail_on_confirm: AtomicBool,
    fail_on_cancel: AtomicBool,
    fail_on_commit: AtomicBool,
}

impl Faults {
    fn check(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable(format!("{op} failed")));
        }
        Ok(())
    }
}

/// In-memory booking ledger.
///
/// A transaction owns the ledger mutex for its whole lifetime, which gives
/// every read inside it the exclusivity of `SELECT ... FOR UPDATE`. Writes
/// are staged and applied on commit.
#[derive(Debug, Clone)]
pub struct InMemoryBookingLedger {
    state: Arc<Mutex<LedgerState>>,
    clock: Arc<dyn Clock>,
    faults: Arc<Faults>,
}

impl Default for InMemoryBookingLedger {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryBookingLedger {
    /// Creates a new empty ledger using the system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new empty ledger that stamps rows with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            clock,
            faults: Arc::new(Faults::default()),
        }
    }

    /// Makes subsequent inserts fail.
    pub fn set_fail_on_insert(&self, fail: bool) {
        self.faults.fail_on_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent changes to `CONFIRMED` fail.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.faults.fail_on_confirm.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent changes to `CANCELLED` fail.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.faults.fail_on_cancel.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent commits fail.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.faults.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of committed bookings.
    pub async fn booking_count(&self) -> usize {
        self.state.lock().await.bookings.len()
    }
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged: HashMap::new(),
            clock: self.clock.clone(),
            faults: self.faults.clone(),
        }))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_for_customer(
        &self,
        customer_id: UserId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.customer_id == customer_id)
            .filter(|b| status.is_none_or(|s| s == b.status))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(bookings)
    }

    async fn list_for_salon(
        &self,
        salon_id: SalonId,
        filter: SalonBookingFilter,
    ) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.salon_id == salon_id && filter.matches(b))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.booking_date, b.booking_time, b.id));
        Ok(bookings)
    }

    async fn find_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < created_before)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| (b.created_at, b.id));
        bookings.truncate(limit);
        Ok(bookings)
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    staged: HashMap<BookingId, Booking>,
    clock: Arc<dyn Clock>,
    faults: Arc<Faults>,
}

impl InMemoryTransaction {
    fn current(&self, id: BookingId) -> Option<&Booking> {
        self.staged
            .get(&id)
            .or_else(|| self.guard.bookings.get(&id))
    }
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn insert(&mut self, booking: NewBooking) -> Result<Booking> {
        Faults::check(&self.faults.fail_on_insert, "insert")?;
        booking.validate()?;
        if self.current(booking.id).is_some() {
            return Err(LedgerError::AlreadyExists(booking.id));
        }

        let stored = booking.into_pending(self.clock.now());
        self.staged.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_for_update(&mut self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.current(id).cloned())
    }

    async fn set_status(&mut self, id: BookingId, status: BookingStatus) -> Result<Booking> {
        match status {
            BookingStatus::Confirmed => Faults::check(&self.faults.fail_on_confirm, "confirm")?,
            BookingStatus::Cancelled => Faults::check(&self.faults.fail_on_cancel, "cancel")?,
            _ => {}
        }

        let mut booking = self.current(id).cloned().ok_or(LedgerError::NotFound(id))?;
        if !booking.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                from: booking.status,
                to: status,
            });
        }

        booking.status = status;
        booking.updated_at = self.clock.now();
        self.staged.insert(id, booking.clone());
        Ok(booking)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        Faults::check(&self.faults.fail_on_commit, "commit")?;
        let InMemoryTransaction {
            mut guard, staged, ..
        } = *self;
        guard.bookings.extend(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BookingItem;
    use chrono::{Duration, NaiveDate, NaiveTime};
    use common::{ManualClock, Money, ServiceId, SlotId};

    fn new_booking(customer_id: UserId, salon_id: SalonId, hour: u32) -> NewBooking {
        NewBooking {
            id: BookingId::new(),
            customer_id,
            salon_id,
            slot_id: SlotId::new(),
            booking_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            booking_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            notes: Some("window seat".to_string()),
            items: vec![BookingItem {
                service_id: ServiceId::new(),
                service_name: "Haircut".to_string(),
                price: Money::from_dollars(50),
                duration_minutes: 30,
            }],
        }
    }

    async fn insert_committed(ledger: &InMemoryBookingLedger, booking: NewBooking) -> Booking {
        let mut tx = ledger.begin().await.unwrap();
        let stored = tx.insert(booking).await.unwrap();
        tx.commit().await.unwrap();
        stored
    }

    #[tokio::test]
    async fn test_insert_visible_only_after_commit() {
        let ledger = InMemoryBookingLedger::new();
        let booking = new_booking(UserId::new(), SalonId::new(), 9);
        let id = booking.id;

        let mut tx = ledger.begin().await.unwrap();
        let stored = tx.insert(booking).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(stored.total_amount, Money::from_dollars(50));
        assert!(tx.get_for_update(id).await.unwrap().is_some());
        tx.commit().await.unwrap();

        assert_eq!(ledger.get(id).await.unwrap().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let ledger = InMemoryBookingLedger::new();
        let booking = new_booking(UserId::new(), SalonId::new(), 9);
        let id = booking.id;

        {
            let mut tx = ledger.begin().await.unwrap();
            tx.insert(booking).await.unwrap();
        }

        assert!(ledger.get(id).await.unwrap().is_none());
        assert_eq!(ledger.booking_count().await, 0);
    }

    #[tokio::test]
    async fn test_rollback_discards_status_change() {
        let ledger = InMemoryBookingLedger::new();
        let stored = insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 9)).await;

        let mut tx = ledger.begin().await.unwrap();
        tx.set_status(stored.id, BookingStatus::Cancelled)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let current = ledger.get(stored.id).await.unwrap().unwrap();
        assert_eq!(current.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_set_status_enforces_state_machine() {
        let clock = ManualClock::new(Utc::now());
        let ledger = InMemoryBookingLedger::with_clock(Arc::new(clock.clone()));
        let stored = insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 9)).await;

        clock.advance(Duration::seconds(5));
        let mut tx = ledger.begin().await.unwrap();
        let confirmed = tx
            .set_status(stored.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.updated_at, clock.now());
        let cancelled = tx
            .set_status(stored.id, BookingStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        let err = tx
            .set_status(stored.id, BookingStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: BookingStatus::Cancelled,
                to: BookingStatus::Confirmed
            }
        ));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_status_unknown_booking() {
        let ledger = InMemoryBookingLedger::new();
        let mut tx = ledger.begin().await.unwrap();
        let err = tx
            .set_status(BookingId::new(), BookingStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_service_and_id() {
        let ledger = InMemoryBookingLedger::new();
        let mut booking = new_booking(UserId::new(), SalonId::new(), 9);
        let dup = booking.items[0].clone();
        booking.items.push(dup);

        let mut tx = ledger.begin().await.unwrap();
        assert!(matches!(
            tx.insert(booking).await,
            Err(LedgerError::DuplicateService(_))
        ));

        let booking = new_booking(UserId::new(), SalonId::new(), 9);
        tx.insert(booking.clone()).await.unwrap();
        assert!(matches!(
            tx.insert(booking).await,
            Err(LedgerError::AlreadyExists(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cancels_serialize() {
        let ledger = InMemoryBookingLedger::new();
        let stored = insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 9)).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    let mut tx = ledger.begin().await?;
                    let current = tx
                        .get_for_update(stored.id)
                        .await?
                        .ok_or(LedgerError::NotFound(stored.id))?;
                    if current.status.is_terminal() {
                        return Ok(false);
                    }
                    tx.set_status(stored.id, BookingStatus::Cancelled).await?;
                    tx.commit().await?;
                    Ok::<_, LedgerError>(true)
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_listings() {
        let clock = ManualClock::new(Utc::now());
        let ledger = InMemoryBookingLedger::with_clock(Arc::new(clock.clone()));
        let customer = UserId::new();
        let salon = SalonId::new();

        let late = insert_committed(&ledger, new_booking(customer, salon, 15)).await;
        clock.advance(Duration::seconds(1));
        let early = insert_committed(&ledger, new_booking(customer, salon, 9)).await;
        insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 10)).await;

        let mut tx = ledger.begin().await.unwrap();
        tx.set_status(early.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mine = ledger.list_for_customer(customer, None).await.unwrap();
        assert_eq!(
            mine.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![early.id, late.id]
        );

        let pending = ledger
            .list_for_customer(customer, Some(BookingStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, late.id);

        let salon_bookings = ledger
            .list_for_salon(salon, SalonBookingFilter::default())
            .await
            .unwrap();
        assert_eq!(
            salon_bookings.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![early.id, late.id]
        );

        let confirmed = ledger
            .list_for_salon(
                salon,
                SalonBookingFilter {
                    status: Some(BookingStatus::Confirmed),
                    date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_find_stale_pending() {
        let clock = ManualClock::new(Utc::now());
        let ledger = InMemoryBookingLedger::with_clock(Arc::new(clock.clone()));

        let old = insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 9)).await;
        let old_confirmed =
            insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 10)).await;
        let mut tx = ledger.begin().await.unwrap();
        tx.set_status(old_confirmed.id, BookingStatus::Confirmed)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        clock.advance(Duration::minutes(20));
        insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 11)).await;

        let stale = ledger
            .find_stale_pending(clock.now() - Duration::minutes(15), 10)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);

        let none = ledger
            .find_stale_pending(clock.now() - Duration::minutes(15), 0)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let ledger = InMemoryBookingLedger::new();
        ledger.set_fail_on_insert(true);
        let mut tx = ledger.begin().await.unwrap();
        assert!(matches!(
            tx.insert(new_booking(UserId::new(), SalonId::new(), 9))
                .await,
            Err(LedgerError::Unavailable(_))
        ));
        drop(tx);
        ledger.set_fail_on_insert(false);

        let stored = insert_committed(&ledger, new_booking(UserId::new(), SalonId::new(), 9)).await;
        ledger.set_fail_on_confirm(true);
        let mut tx = ledger.begin().await.unwrap();
        assert!(
            tx.set_status(stored.id, BookingStatus::Confirmed)
                .await
                .is_err()
        );
        tx.set_status(stored.id, BookingStatus::Cancelled)
            .await
            .unwrap();
        ledger.set_fail_on_commit(true);
        assert!(tx.commit().await.is_err());
        ledger.set_fail_on_commit(false);

        let current = ledger.get(stored.id).await.unwrap().unwrap();
        assert_eq!(current.status, BookingStatus::Pending);
    }
}
