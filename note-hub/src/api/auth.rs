use super::{error::ApiError, AppState};
use axum::{extract::FromRequestParts, http::request::Parts};
use note_hub_core::{model::Identity, CoreError};

/// Caller resolved from the `Authorization: Bearer` header.
#[derive(Clone, Debug)]
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(ApiError(CoreError::Unauthenticated))?;
        let identity = state.hub.gate.authenticate(token).await?;
        Ok(Self(identity))
    }
}
