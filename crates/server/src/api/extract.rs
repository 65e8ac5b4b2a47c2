use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use server_api::auth::{verify_token, AuthenticatedUser};
use shared::error::ApiError;

use super::{http_error, HttpError};
use crate::app_state::AppState;

/// Caller identity taken from an `Authorization: Bearer <token>` header.
pub(crate) struct Caller(pub(crate) AuthenticatedUser);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                http_error(ApiError::unauthorized(
                    "authentication credentials were not provided",
                ))
            })?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| http_error(ApiError::unauthorized("expected a bearer token")))?;
        verify_token(&state.api.auth, token)
            .map(Caller)
            .map_err(http_error)
    }
}
