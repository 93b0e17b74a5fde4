//! Fixed token authentication for server-to-server calls.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::utils::signature::secure_compare;

use crate::services::API_KEY_HEADER;
use crate::AppState;

/// Proof that the request carried the configured API token in `X-Api-Key`.
#[derive(Debug, Clone, Copy)]
pub struct ApiToken;

#[async_trait]
impl FromRequestParts<AppState> for ApiToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                tracing::warn!("anonymous access attempt");
                AppError::Unauthorized("you must be logged in for this operation".to_string())
            })?;

        let expected = state.config.security.fixed_token.api.expose_secret();
        if !secure_compare(expected, presented) {
            tracing::warn!("request with invalid api token");
            return Err(AppError::Unauthorized("invalid api token".to_string()));
        }

        Ok(ApiToken)
    }
}
