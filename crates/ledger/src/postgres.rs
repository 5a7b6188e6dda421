use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BookingId, Clock, Money, SalonId, ServiceId, SlotId, SystemClock, UserId};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::debug;
use uuid::Uuid;

use crate::{
    Booking, BookingItem, BookingStatus, LedgerError, NewBooking, Result, SalonBookingFilter,
    store::{BookingLedger, LedgerTransaction},
};

const BOOKING_COLUMNS: &str = "id, customer_id, salon_id, slot_id, status, total_amount_cents, \
     booking_date, booking_time, notes, created_at, updated_at";

/// PostgreSQL-backed booking ledger.
#[derive(Debug, Clone)]
pub struct PostgresBookingLedger {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresBookingLedger {
    /// Creates a new PostgreSQL booking ledger.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for `created_at`/`updated_at`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_booking(row: &PgRow) -> Result<Booking> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<BookingStatus>()
        .map_err(|e| LedgerError::CorruptRow(e.to_string()))?;

    Ok(Booking {
        id: BookingId::from_uuid(row.try_get::<Uuid, _>("id")?),
        customer_id: UserId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        salon_id: SalonId::from_uuid(row.try_get::<Uuid, _>("salon_id")?),
        slot_id: SlotId::from_uuid(row.try_get::<Uuid, _>("slot_id")?),
        status,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        booking_date: row.try_get("booking_date")?,
        booking_time: row.try_get("booking_time")?,
        notes: row.try_get("notes")?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<(BookingId, BookingItem)> {
    let duration: i32 = row.try_get("duration_minutes")?;
    let duration_minutes = u32::try_from(duration)
        .map_err(|_| LedgerError::CorruptRow(format!("duration_minutes={duration}")))?;

    Ok((
        BookingId::from_uuid(row.try_get::<Uuid, _>("booking_id")?),
        BookingItem {
            service_id: ServiceId::from_uuid(row.try_get::<Uuid, _>("service_id")?),
            service_name: row.try_get("service_name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            duration_minutes,
        },
    ))
}

/// Maps booking rows and attaches their items in stored order.
async fn hydrate(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Booking>> {
    let mut bookings = rows.iter().map(row_to_booking).collect::<Result<Vec<_>>>()?;
    if bookings.is_empty() {
        return Ok(bookings);
    }

    let ids: Vec<Uuid> = bookings.iter().map(|b| b.id.as_uuid()).collect();
    let item_rows = sqlx::query(
        r#"
        SELECT booking_id, service_id, service_name, price_cents, duration_minutes
        FROM booking_items
        WHERE booking_id = ANY($1)
        ORDER BY booking_id, position ASC
        "#,
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<BookingId, Vec<BookingItem>> = HashMap::new();
    for row in &item_rows {
        let (booking_id, item) = row_to_item(row)?;
        items.entry(booking_id).or_default().push(item);
    }
    for booking in &mut bookings {
        booking.items = items.remove(&booking.id).unwrap_or_default();
    }
    Ok(bookings)
}

async fn fetch_one(
    conn: &mut PgConnection,
    id: BookingId,
    for_update: bool,
) -> Result<Option<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let rows = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?;
    Ok(hydrate(conn, rows).await?.pop())
}

#[async_trait]
impl BookingLedger for PostgresBookingLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresLedgerTransaction {
            tx,
            clock: self.clock.clone(),
        }))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let mut conn = self.pool.acquire().await?;
        fetch_one(&mut conn, id, false).await
    }

    async fn list_for_customer(
        &self,
        customer_id: UserId,
        status: Option<BookingStatus>,
    ) -> Result<Vec<Booking>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE customer_id = $1 AND ($2::varchar IS NULL OR status = $2)
            ORDER BY created_at DESC, id ASC
            "#
        ))
        .bind(customer_id.as_uuid())
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&mut *conn)
        .await?;
        hydrate(&mut conn, rows).await
    }

    async fn list_for_salon(
        &self,
        salon_id: SalonId,
        filter: SalonBookingFilter,
    ) -> Result<Vec<Booking>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE salon_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::date IS NULL OR booking_date = $3)
            ORDER BY booking_date ASC, booking_time ASC, id ASC
            "#
        ))
        .bind(salon_id.as_uuid())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.date)
        .fetch_all(&mut *conn)
        .await?;
        hydrate(&mut conn, rows).await
    }

    async fn find_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE status = 'PENDING' AND created_at < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(created_before)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
        hydrate(&mut conn, rows).await
    }
}

/// Ledger transaction over a `sqlx` transaction; dropping it rolls back.
pub struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl LedgerTransaction for PostgresLedgerTransaction {
    async fn insert(&mut self, booking: NewBooking) -> Result<Booking> {
        booking.validate()?;
        let stored = booking.into_pending(self.clock.now());

        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, customer_id, salon_id, slot_id, status, total_amount_cents,
                 booking_date, booking_time, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.customer_id.as_uuid())
        .bind(stored.salon_id.as_uuid())
        .bind(stored.slot_id.as_uuid())
        .bind(stored.status.as_str())
        .bind(stored.total_amount.cents())
        .bind(stored.booking_date)
        .bind(stored.booking_time)
        .bind(&stored.notes)
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("bookings_pkey")
            {
                return LedgerError::AlreadyExists(stored.id);
            }
            LedgerError::Database(e)
        })?;

        for (position, item) in stored.items.iter().enumerate() {
            let duration = i32::try_from(item.duration_minutes).map_err(|_| {
                LedgerError::CorruptRow(format!("duration_minutes={}", item.duration_minutes))
            })?;
            let position = i32::try_from(position)
                .map_err(|_| LedgerError::CorruptRow(format!("position={position}")))?;

            sqlx::query(
                r#"
                INSERT INTO booking_items
                    (booking_id, service_id, service_name, price_cents, duration_minutes, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(stored.id.as_uuid())
            .bind(item.service_id.as_uuid())
            .bind(&item.service_name)
            .bind(item.price.cents())
            .bind(duration)
            .bind(position)
            .execute(&mut *self.tx)
            .await?;
        }
        debug!(booking_id = %stored.id, items = stored.items.len(), "booking insert staged");

        Ok(stored)
    }

    async fn get_for_update(&mut self, id: BookingId) -> Result<Option<Booking>> {
        fetch_one(&mut self.tx, id, true).await
    }

    async fn set_status(&mut self, id: BookingId, status: BookingStatus) -> Result<Booking> {
        let current = fetch_one(&mut self.tx, id, true)
            .await?
            .ok_or(LedgerError::NotFound(id))?;
        if !current.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let now = self.clock.now();
        sqlx::query("UPDATE bookings SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *self.tx)
            .await?;
        debug!(booking_id = %id, from = %current.status, to = %status, "booking status staged");

        Ok(Booking {
            status,
            updated_at: now,
            ..current
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
