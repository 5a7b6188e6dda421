//! Slot availability and slot lock endpoints.

use std::sync::Arc;

use availability::{AcquireOutcome, LockGrant, ReleaseOutcome, Slot, SlotQuery};
use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::NaiveDate;
use common::{SalonId, ServiceId, SlotId};
use saga::BookingError;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// Longest lock a client may request.
pub const MAX_LOCK_MINUTES: i64 = 60;

#[derive(Debug, Deserialize)]
pub struct SlotListParams {
    pub salon_id: SalonId,
    pub date: NaiveDate,
    pub service_id: Option<ServiceId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LockRequest {
    #[serde(alias = "durationMinutes")]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub slot_id: SlotId,
    pub released: bool,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

/// GET /slots: open, unlocked slots for a salon and date.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SlotListParams>,
) -> Result<Json<Vec<Slot>>, ApiError> {
    let mut query = SlotQuery::new(params.salon_id, params.date);
    if let Some(service_id) = params.service_id {
        query = query.service(service_id);
    }
    Ok(Json(state.slots.get_available(query).await?))
}

/// GET /slots/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<SlotId>,
) -> Result<Json<Slot>, ApiError> {
    let slot = state
        .slots
        .get_slot(slot_id)
        .await?
        .ok_or(BookingError::SlotNotFound(slot_id))?;
    Ok(Json(slot))
}

/// POST /slots/{id}/lock: hold a slot for the caller.
#[tracing::instrument(skip(state, caller, body), fields(user_id = %caller.0.user_id))]
pub async fn lock(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(slot_id): Path<SlotId>,
    body: Option<Json<LockRequest>>,
) -> Result<Json<LockGrant>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let ttl = match request.duration_minutes {
        None => state.lock_ttl,
        Some(minutes) if (1..=MAX_LOCK_MINUTES).contains(&minutes) => {
            chrono::Duration::minutes(minutes)
        }
        Some(minutes) => {
            return Err(ApiError::BadRequest(format!(
                "duration_minutes must be between 1 and {MAX_LOCK_MINUTES}, got {minutes}"
            )));
        }
    };

    match state.locks.acquire(slot_id, caller.0.user_id, ttl).await? {
        AcquireOutcome::Granted(grant) => Ok(Json(grant)),
        AcquireOutcome::Conflict(reason) => {
            Err(BookingError::SlotUnavailable(reason.to_string()).into())
        }
    }
}

/// DELETE /slots/{id}/lock: release the caller's own lock.
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.0.user_id))]
pub async fn unlock(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(slot_id): Path<SlotId>,
) -> Result<Json<ReleaseResponse>, ApiError> {
    match state.locks.release(slot_id, caller.0.user_id).await? {
        ReleaseOutcome::Released => Ok(Json(ReleaseResponse {
            slot_id,
            released: true,
        })),
        ReleaseOutcome::NotFound => Err(ApiError::NotFound(
            "Lock not found or not owned by user".to_string(),
        )),
    }
}

/// POST /locks/purge: drop expired locks now. Managers only.
#[tracing::instrument(skip(state, caller))]
pub async fn purge_locks(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<PurgeResponse>, ApiError> {
    if !caller.0.can_manage_bookings() {
        return Err(BookingError::Unauthorized(
            "only salon owners and admins may purge locks".to_string(),
        )
        .into());
    }
    let purged = state.locks.purge_expired().await?;
    Ok(Json(PurgeResponse { purged }))
}
