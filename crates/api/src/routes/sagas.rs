//! Saga record endpoint for recovery tooling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::SagaId;
use saga::{BookingError, SagaInstance};

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

/// GET /sagas/{id}: the saga rebuilt from its events.
///
/// Visible to the saga's customer and to salon owners and admins.
#[tracing::instrument(skip(state, caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(saga_id): Path<SagaId>,
) -> Result<Json<SagaInstance>, ApiError> {
    let saga = state
        .coordinator
        .get_saga(saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {saga_id} not found")))?;

    let visible = saga
        .customer_id()
        .is_some_and(|owner| caller.0.may_act_for(owner))
        || caller.0.can_manage_bookings();
    if !visible {
        return Err(BookingError::Unauthorized("saga belongs to another customer".to_string()).into());
    }
    Ok(Json(saga))
}
