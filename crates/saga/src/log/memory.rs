use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use tokio::sync::RwLock;

use super::{Result, SagaLog, SagaLogError};
use crate::events::SagaEvent;

#[derive(Debug, Clone)]
struct Entry {
    saga_id: SagaId,
    event: SagaEvent,
    recorded_at: DateTime<Utc>,
}

/// In-memory saga log for tests and database-less deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemorySagaLog {
    entries: Arc<RwLock<Vec<Entry>>>,
    fail_on_append: Arc<AtomicBool>,
}

impl InMemorySagaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent appends fail.
    pub fn set_fail_on_append(&self, fail: bool) {
        self.fail_on_append.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of events across all sagas.
    pub async fn event_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SagaLog for InMemorySagaLog {
    async fn append(
        &self,
        saga_id: SagaId,
        event: &SagaEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_on_append.load(Ordering::SeqCst) {
            return Err(SagaLogError::Unavailable("append failed".to_string()));
        }
        self.entries.write().await.push(Entry {
            saga_id,
            event: event.clone(),
            recorded_at,
        });
        Ok(())
    }

    async fn load(&self, saga_id: SagaId) -> Result<Vec<SagaEvent>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.saga_id == saga_id)
            .map(|e| e.event.clone())
            .collect())
    }

    async fn stuck_sagas(&self, older_than: DateTime<Utc>) -> Result<Vec<SagaId>> {
        let entries = self.entries.read().await;

        // (saga, first recorded_at, finished), in first-seen order
        let mut sagas: Vec<(SagaId, DateTime<Utc>, bool)> = Vec::new();
        for entry in entries.iter() {
            match sagas.iter_mut().find(|(id, _, _)| *id == entry.saga_id) {
                Some((_, started, finished)) => {
                    *started = (*started).min(entry.recorded_at);
                    *finished |= entry.event.is_terminal();
                }
                None => sagas.push((
                    entry.saga_id,
                    entry.recorded_at,
                    entry.event.is_terminal(),
                )),
            }
        }

        sagas.retain(|(_, started, finished)| !finished && *started < older_than);
        sagas.sort_by_key(|(_, started, _)| *started);
        Ok(sagas.into_iter().map(|(id, _, _)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use common::{BookingId, SalonId, ServiceId, SlotId, UserId};

    fn started(saga_id: SagaId, at: DateTime<Utc>) -> SagaEvent {
        SagaEvent::saga_started(
            saga_id,
            UserId::new(),
            SalonId::new(),
            SlotId::new(),
            vec![ServiceId::new()],
            at,
        )
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();
        let now = Utc::now();

        log.append(saga_id, &started(saga_id, now), now).await.unwrap();
        log.append(saga_id, &SagaEvent::lock_acquired(now), now)
            .await
            .unwrap();
        log.append(SagaId::new(), &SagaEvent::lock_acquired(now), now)
            .await
            .unwrap();

        let events = log.load(saga_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "SagaStarted");
        assert_eq!(events[1].event_type(), "LockAcquired");
        assert!(log.load(SagaId::new()).await.unwrap().is_empty());
        assert_eq!(log.event_count().await, 3);
    }

    #[tokio::test]
    async fn test_injected_append_failure() {
        let log = InMemorySagaLog::new();
        let saga_id = SagaId::new();
        let now = Utc::now();

        log.set_fail_on_append(true);
        assert!(matches!(
            log.append(saga_id, &started(saga_id, now), now).await,
            Err(SagaLogError::Unavailable(_))
        ));
        assert_eq!(log.event_count().await, 0);

        log.set_fail_on_append(false);
        log.append(saga_id, &started(saga_id, now), now).await.unwrap();
        assert_eq!(log.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_stuck_sagas_excludes_finished_and_recent() {
        let log = InMemorySagaLog::new();
        let t0 = Utc::now();

        let stuck = SagaId::new();
        log.append(stuck, &started(stuck, t0), t0).await.unwrap();
        log.append(stuck, &SagaEvent::booking_recorded(BookingId::new()), t0)
            .await
            .unwrap();

        let confirmed = SagaId::new();
        log.append(confirmed, &started(confirmed, t0), t0)
            .await
            .unwrap();
        log.append(
            confirmed,
            &SagaEvent::booking_confirmed(BookingId::new(), t0),
            t0,
        )
        .await
        .unwrap();

        let failed = SagaId::new();
        log.append(failed, &started(failed, t0), t0).await.unwrap();
        log.append(
            failed,
            &SagaEvent::saga_failed(ErrorKind::SlotUnavailable, "locked", t0),
            t0,
        )
        .await
        .unwrap();

        let recent = SagaId::new();
        let t1 = t0 + Duration::minutes(20);
        log.append(recent, &started(recent, t1), t1).await.unwrap();

        let found = log.stuck_sagas(t0 + Duration::minutes(10)).await.unwrap();
        assert_eq!(found, vec![stuck]);
    }
}
