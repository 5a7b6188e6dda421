use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::{BookingId, Clock, SalonId, ServiceId, SlotId, StaffId, SystemClock, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AcquireOutcome, AvailabilityError, FinalizeOutcome, LockGrant, ReleaseOutcome, Result, Slot,
    SlotLock, SlotQuery, SlotRelease,
    lock::{check_acquire, validate_ttl},
    store::{LockManager, SlotStore},
};

/// PostgreSQL-backed slot store and lock manager.
///
/// Every check-then-write runs inside a transaction holding a row lock on the
/// `time_slots` row, so concurrent acquires and finalizes on one slot are
/// serialized by the database.
#[derive(Debug, Clone)]
pub struct PostgresSlotStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresSlotStore {
    /// Creates a new PostgreSQL slot store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock used for lock expiry.
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

    fn row_to_slot(row: PgRow) -> Result<Slot> {
        let duration: i32 = row.try_get("duration_minutes")?;
        let duration_minutes = u32::try_from(duration)
            .map_err(|_| AvailabilityError::CorruptRow(format!("duration_minutes={duration}")))?;

        Ok(Slot {
            id: SlotId::from_uuid(row.try_get::<Uuid, _>("id")?),
            salon_id: SalonId::from_uuid(row.try_get::<Uuid, _>("salon_id")?),
            staff_id: row
                .try_get::<Option<Uuid>, _>("staff_id")?
                .map(StaffId::from_uuid),
            service_id: ServiceId::from_uuid(row.try_get::<Uuid, _>("service_id")?),
            date: row.try_get("slot_date")?,
            time: row.try_get("slot_time")?,
            duration_minutes,
            available: row.try_get("is_available")?,
            booked: row.try_get("is_booked")?,
            booking_id: row
                .try_get::<Option<Uuid>, _>("booking_id")?
                .map(BookingId::from_uuid),
        })
    }

    fn row_to_lock(row: PgRow) -> Result<SlotLock> {
        Ok(SlotLock {
            slot_id: SlotId::from_uuid(row.try_get::<Uuid, _>("slot_id")?),
            holder: UserId::from_uuid(row.try_get::<Uuid, _>("locked_by")?),
            locked_at: row.try_get("locked_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[async_trait]
impl LockManager for PostgresSlotStore {
    #[tracing::instrument(skip(self), fields(slot_id = %slot_id))]
    async fn acquire(
        &self,
        slot_id: SlotId,
        holder: UserId,
        ttl: Duration,
    ) -> Result<AcquireOutcome> {
        validate_ttl(ttl)?;

        let mut tx = self.pool.begin().await?;

        let slot_row = sqlx::query(
            "SELECT is_available, is_booked FROM time_slots WHERE id = $1 FOR UPDATE",
        )
        .bind(slot_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AvailabilityError::SlotNotFound(slot_id))?;
        let available: bool = slot_row.try_get("is_available")?;
        let booked: bool = slot_row.try_get("is_booked")?;

        let existing = sqlx::query(
            r#"
            SELECT slot_id, locked_by, locked_at, expires_at
            FROM slot_locks
            WHERE slot_id = $1
            FOR UPDATE
            "#,
        )
        .bind(slot_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .map(Self::row_to_lock)
        .transpose()?;

        let now = self.clock.now();
        let renewed = match check_acquire(available, booked, existing.as_ref(), holder, now) {
            Ok(renewed) => renewed,
            Err(reason) => {
                tx.rollback().await?;
                metrics::counter!("slot_lock_conflicts_total").increment(1);
                tracing::debug!(%reason, "slot lock refused");
                return Ok(AcquireOutcome::Conflict(reason));
            }
        };

        let expires_at = now + ttl;
        sqlx::query(
            r#"
            INSERT INTO slot_locks (slot_id, locked_by, locked_at, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slot_id) DO UPDATE
            SET locked_by = EXCLUDED.locked_by,
                locked_at = EXCLUDED.locked_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(slot_id.as_uuid())
        .bind(holder.as_uuid())
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        metrics::counter!("slot_lock_acquired_total").increment(1);

        Ok(AcquireOutcome::Granted(LockGrant {
            slot_id,
            holder,
            expires_at,
            renewed,
        }))
    }

    async fn release(&self, slot_id: SlotId, holder: UserId) -> Result<ReleaseOutcome> {
        let result = sqlx::query(
            "DELETE FROM slot_locks WHERE slot_id = $1 AND locked_by = $2 AND expires_at > $3",
        )
        .bind(slot_id.as_uuid())
        .bind(holder.as_uuid())
        .bind(self.clock.now())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::NotFound
        })
    }

    async fn current_lock(&self, slot_id: SlotId) -> Result<Option<SlotLock>> {
        sqlx::query(
            r#"
            SELECT slot_id, locked_by, locked_at, expires_at
            FROM slot_locks
            WHERE slot_id = $1 AND expires_at > $2
            "#,
        )
        .bind(slot_id.as_uuid())
        .bind(self.clock.now())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_lock)
        .transpose()
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM slot_locks WHERE expires_at <= $1")
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SlotStore for PostgresSlotStore {
    async fn get_available(&self, query: SlotQuery) -> Result<Vec<Slot>> {
        let rows = sqlx::query(
            r#"
            SELECT ts.id, ts.salon_id, ts.staff_id, ts.service_id, ts.slot_date, ts.slot_time,
                   ts.duration_minutes, ts.is_available, ts.is_booked, ts.booking_id
            FROM time_slots ts
            LEFT JOIN slot_locks sl ON sl.slot_id = ts.id AND sl.expires_at > $4
            WHERE ts.salon_id = $1
              AND ts.slot_date = $2
              AND ($3::uuid IS NULL OR ts.service_id = $3)
              AND ts.is_available
              AND NOT ts.is_booked
              AND sl.slot_id IS NULL
            ORDER BY ts.slot_time ASC, ts.id ASC
            "#,
        )
        .bind(query.salon_id.as_uuid())
        .bind(query.date)
        .bind(query.service_id.map(|s| s.as_uuid()))
        .bind(self.clock.now())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_slot).collect()
    }

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        sqlx::query(
            r#"
            SELECT id, salon_id, staff_id, service_id, slot_date, slot_time,
                   duration_minutes, is_available, is_booked, booking_id
            FROM time_slots
            WHERE id = $1
            "#,
        )
        .bind(slot_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_slot)
        .transpose()
    }

    #[tracing::instrument(skip(self), fields(slot_id = %slot_id, booking_id = %booking_id))]
    async fn finalize(&self, slot_id: SlotId, booking_id: BookingId) -> Result<FinalizeOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(row) =
            sqlx::query("SELECT is_booked, booking_id FROM time_slots WHERE id = $1 FOR UPDATE")
                .bind(slot_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
        else {
            return Ok(FinalizeOutcome::NotFound);
        };

        if row.try_get::<bool, _>("is_booked")? {
            let owner = row
                .try_get::<Option<Uuid>, _>("booking_id")?
                .map(BookingId::from_uuid);
            tx.rollback().await?;
            return Ok(FinalizeOutcome::AlreadyBooked { booking_id: owner });
        }

        sqlx::query("UPDATE time_slots SET is_booked = TRUE, booking_id = $2 WHERE id = $1")
            .bind(slot_id.as_uuid())
            .bind(booking_id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM slot_locks WHERE slot_id = $1")
            .bind(slot_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(FinalizeOutcome::Finalized)
    }

    async fn release_slot(&self, slot_id: SlotId, booking_id: BookingId) -> Result<SlotRelease> {
        let result = sqlx::query(
            r#"
            UPDATE time_slots
            SET is_booked = FALSE, booking_id = NULL
            WHERE id = $1 AND is_booked AND booking_id = $2
            "#,
        )
        .bind(slot_id.as_uuid())
        .bind(booking_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() > 0 {
            SlotRelease::Released
        } else {
            SlotRelease::NotHeld
        })
    }

    async fn import_slots(&self, slots: Vec<Slot>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for slot in &slots {
            let duration = i32::try_from(slot.duration_minutes).map_err(|_| {
                AvailabilityError::CorruptRow(format!(
                    "duration_minutes={}",
                    slot.duration_minutes
                ))
            })?;

            let result = sqlx::query(
                r#"
                INSERT INTO time_slots
                    (id, salon_id, staff_id, service_id, slot_date, slot_time,
                     duration_minutes, is_available, is_booked, booking_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, NULL)
                ON CONFLICT (id) DO UPDATE
                SET salon_id = EXCLUDED.salon_id,
                    staff_id = EXCLUDED.staff_id,
                    service_id = EXCLUDED.service_id,
                    slot_date = EXCLUDED.slot_date,
                    slot_time = EXCLUDED.slot_time,
                    duration_minutes = EXCLUDED.duration_minutes,
                    is_available = EXCLUDED.is_available
                WHERE NOT time_slots.is_booked
                "#,
            )
            .bind(slot.id.as_uuid())
            .bind(slot.salon_id.as_uuid())
            .bind(slot.staff_id.map(|s| s.as_uuid()))
            .bind(slot.service_id.as_uuid())
            .bind(slot.date)
            .bind(slot.time)
            .bind(duration)
            .bind(slot.available)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}
