use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{Result, SagaLog};
use crate::events::SagaEvent;

/// PostgreSQL-backed saga log over the `saga_events` table.
#[derive(Clone)]
pub struct PostgresSagaLog {
    pool: PgPool,
}

impl PostgresSagaLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
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

#[async_trait]
impl SagaLog for PostgresSagaLog {
    async fn append(
        &self,
        saga_id: SagaId,
        event: &SagaEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        let payload = serde_json::to_value(event)?;

        sqlx::query(
            r#"
            INSERT INTO saga_events (saga_id, event_type, payload, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(saga_id.as_uuid())
        .bind(event.event_type())
        .bind(payload)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT payload
            FROM saga_events
            WHERE saga_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let payload: serde_json::Value = row.try_get("payload")?;
                Ok(serde_json::from_value(payload)?)
            })
            .collect()
    }

    async fn stuck_sagas(&self, older_than: DateTime<Utc>) -> Result<Vec<SagaId>> {
        let rows = sqlx::query(
            r#"
            SELECT saga_id
            FROM saga_events
            GROUP BY saga_id
            HAVING MIN(recorded_at) < $1
               AND NOT bool_or(event_type IN ('BookingConfirmed', 'SagaFailed'))
            ORDER BY MIN(recorded_at) ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?)))
            .collect()
    }
}
