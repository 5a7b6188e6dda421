//! API error types with HTTP response mapping.

use availability::AvailabilityError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{BookingError, ErrorKind};

/// API-level error type that maps to HTTP responses.
///
/// The body is always `{"error": message, "kind": KIND}`.
#[derive(Debug)]
pub enum ApiError {
    /// The request carried no usable identity.
    Unauthenticated(String),
    /// Resource not found outside the booking error taxonomy.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// A booking, cancellation or slot operation failed.
    Booking(BookingError),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest.as_str()),
            ApiError::Booking(err) => {
                let kind = err.kind();
                (status_for(kind), kind.as_str())
            }
        }
    }
}

/// HTTP status for a booking error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::SlotUnavailable | ErrorKind::AlreadyTerminal => StatusCode::CONFLICT,
        ErrorKind::SlotNotFound | ErrorKind::BookingNotFound | ErrorKind::ServiceNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
        ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::PersistenceError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        let message = match self {
            ApiError::Unauthenticated(msg) | ApiError::NotFound(msg) | ApiError::BadRequest(msg) => {
                msg
            }
            ApiError::Booking(err) => err.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error = %message, kind, "internal server error");
        }
        metrics::counter!("api_errors_total", "kind" => kind).increment(1);

        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        ApiError::Booking(err)
    }
}

impl From<AvailabilityError> for ApiError {
    fn from(err: AvailabilityError) -> Self {
        ApiError::Booking(err.into())
    }
}
