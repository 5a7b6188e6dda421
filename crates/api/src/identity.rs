//! Caller identity extracted from request headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Identity, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The verified [`Identity`] of the caller.
///
/// Headers are read here and nowhere else; handlers pass the inner
/// identity to the coordinator. A missing role means `CUSTOMER`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id: UserId = header_value(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?
            .trim()
            .parse()
            .map_err(|_| ApiError::Unauthenticated(format!("invalid {USER_ID_HEADER} header")))?;

        let role = match header_value(parts, USER_ROLE_HEADER)? {
            Some(raw) => raw
                .parse::<Role>()
                .map_err(|e| ApiError::Unauthenticated(e.to_string()))?,
            None => Role::Customer,
        };

        Ok(Caller(Identity::new(user_id, role)))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| ApiError::Unauthenticated(format!("invalid {name} header")))
        })
        .transpose()
}
