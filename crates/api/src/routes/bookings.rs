//! Booking endpoints: create, read, list and cancel.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{BookingId, SalonId};
use ledger::{Booking, BookingStatus, SalonBookingFilter};
use saga::CreateBooking;
use serde::Deserialize;

use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<BookingStatus>,
}

/// POST /bookings: run the booking saga for the caller.
#[tracing::instrument(skip(state, caller, request), fields(user_id = %caller.0.user_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<CreateBooking>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state.coordinator.create_booking(&caller.0, request).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /bookings: the caller's bookings, newest first.
#[tracing::instrument(skip(state, caller))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state
        .coordinator
        .list_customer_bookings(&caller.0, filter.status)
        .await?;
    Ok(Json(bookings))
}

/// GET /bookings/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.coordinator.get_booking(&caller.0, booking_id).await?))
}

/// POST /bookings/{id}/cancel
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.0.user_id))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(
        state.coordinator.cancel_booking(&caller.0, booking_id).await?,
    ))
}

/// GET /salons/{id}/bookings: a salon's bookings by date and time.
#[tracing::instrument(skip(state, caller))]
pub async fn for_salon(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(salon_id): Path<SalonId>,
    Query(filter): Query<SalonBookingFilter>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let bookings = state
        .coordinator
        .list_salon_bookings(&caller.0, salon_id, filter)
        .await?;
    Ok(Json(bookings))
}
