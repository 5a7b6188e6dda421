//! PostgreSQL integration tests for the booking ledger.
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use common::{BookingId, Clock, ManualClock, Money, SalonId, ServiceId, SlotId, UserId};
use ledger::{
    BookingItem, BookingLedger, BookingStatus, LedgerError, NewBooking, PostgresBookingLedger,
    SalonBookingFilter,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            for migration in [
                include_str!("../../../migrations/001_create_slot_tables.sql"),
                include_str!("../../../migrations/002_create_booking_tables.sql"),
                include_str!("../../../migrations/003_create_saga_events.sql"),
            ] {
                sqlx::raw_sql(migration).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_ledger(clock: &ManualClock) -> PostgresBookingLedger {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE booking_items, bookings")
        .execute(&pool)
        .await
        .unwrap();

    PostgresBookingLedger::new(pool).with_clock(Arc::new(clock.clone()))
}

fn item(name: &str, dollars: i64, minutes: u32) -> BookingItem {
    BookingItem {
        service_id: ServiceId::new(),
        service_name: name.to_string(),
        price: Money::from_dollars(dollars),
        duration_minutes: minutes,
    }
}

fn new_booking(customer_id: UserId, salon_id: SalonId, hour: u32) -> NewBooking {
    NewBooking {
        id: BookingId::new(),
        customer_id,
        salon_id,
        slot_id: SlotId::new(),
        booking_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
        booking_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        notes: None,
        items: vec![item("Haircut", 50, 30), item("Wash", 15, 10)],
    }
}

#[tokio::test]
#[serial]
async fn insert_commit_and_read_back_items_in_order() {
    let clock = ManualClock::new(Utc::now());
    let ledger = get_test_ledger(&clock).await;
    let booking = new_booking(UserId::new(), SalonId::new(), 9);

    let mut tx = ledger.begin().await.unwrap();
    let stored = tx.insert(booking.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = ledger.get(booking.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, BookingStatus::Pending);
    assert_eq!(loaded.total_amount, Money::from_dollars(65));
    assert_eq!(loaded.items, booking.items);
    assert_eq!(loaded.id, stored.id);
}

#[tokio::test]
#[serial]
async fn rollback_and_drop_discard_writes() {
    let clock = ManualClock::new(Utc::now());
    let ledger = get_test_ledger(&clock).await;

    let rolled_back = new_booking(UserId::new(), SalonId::new(), 9);
    let mut tx = ledger.begin().await.unwrap();
    tx.insert(rolled_back.clone()).await.unwrap();
    tx.rollback().await.unwrap();

    let dropped = new_booking(UserId::new(), SalonId::new(), 10);
    {
        let mut tx = ledger.begin().await.unwrap();
        tx.insert(dropped.clone()).await.unwrap();
    }

    assert!(ledger.get(rolled_back.id).await.unwrap().is_none());
    assert!(ledger.get(dropped.id).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn status_transitions_are_validated() {
    let clock = ManualClock::new(Utc::now());
    let ledger = get_test_ledger(&clock).await;
    let booking = new_booking(UserId::new(), SalonId::new(), 9);

    let mut tx = ledger.begin().await.unwrap();
    tx.insert(booking.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = ledger.begin().await.unwrap();
    let current = tx.get_for_update(booking.id).await.unwrap().unwrap();
    assert_eq!(current.items.len(), 2);
    let cancelled = tx
        .set_status(booking.id, BookingStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    tx.commit().await.unwrap();

    let mut tx = ledger.begin().await.unwrap();
    let err = tx
        .set_status(booking.id, BookingStatus::Confirmed)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition { .. }));

    let err = tx
        .set_status(BookingId::new(), BookingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
#[serial]
async fn concurrent_status_changes_serialize_on_row_lock() {
    let clock = ManualClock::new(Utc::now());
    let ledger = get_test_ledger(&clock).await;
    let booking = new_booking(UserId::new(), SalonId::new(), 9);

    let mut tx = ledger.begin().await.unwrap();
    tx.insert(booking.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let attempts = (0..4).map(|_| {
        let ledger = ledger.clone();
        let id = booking.id;
        async move {
            let mut tx = ledger.begin().await.unwrap();
            let current = tx.get_for_update(id).await.unwrap().unwrap();
            if current.status.is_terminal() {
                return false;
            }
            tx.set_status(id, BookingStatus::Cancelled).await.unwrap();
            tx.commit().await.unwrap();
            true
        }
    });
    let results: Vec<bool> = spawn_all(attempts).await;
    assert_eq!(results.iter().filter(|won| **won).count(), 1);
}

async fn spawn_all<F: std::future::Future<Output = bool> + Send + 'static>(
    futures: impl Iterator<Item = F>,
) -> Vec<bool> {
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test]
#[serial]
async fn listings_and_stale_pending() {
    let clock = ManualClock::new(Utc::now());
    let ledger = get_test_ledger(&clock).await;
    let customer = UserId::new();
    let salon = SalonId::new();

    let late = new_booking(customer, salon, 15);
    let early = new_booking(customer, salon, 9);
    for b in [&late, &early] {
        let mut tx = ledger.begin().await.unwrap();
        tx.insert(b.clone()).await.unwrap();
        tx.commit().await.unwrap();
        clock.advance(Duration::seconds(1));
    }

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
    assert!(mine.iter().all(|b| b.items.len() == 2));

    let confirmed = ledger
        .list_for_customer(customer, Some(BookingStatus::Confirmed))
        .await
        .unwrap();
    assert_eq!(confirmed.len(), 1);

    let by_time = ledger
        .list_for_salon(salon, SalonBookingFilter::default())
        .await
        .unwrap();
    assert_eq!(
        by_time.iter().map(|b| b.id).collect::<Vec<_>>(),
        vec![early.id, late.id]
    );
    let other_day = ledger
        .list_for_salon(
            salon,
            SalonBookingFilter {
                status: None,
                date: NaiveDate::from_ymd_opt(2026, 3, 15),
            },
        )
        .await
        .unwrap();
    assert!(other_day.is_empty());

    clock.advance(Duration::minutes(30));
    let stale = ledger
        .find_stale_pending(clock.now() - Duration::minutes(15), 10)
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, late.id);
}
