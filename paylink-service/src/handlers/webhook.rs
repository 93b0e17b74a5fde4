use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::utils::signature::secure_compare;

use crate::dtos::WebhookEventDto;
use crate::services::psp::PspError;
use crate::services::WebhookError;
use crate::AppState;

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::InvalidPaylinkId(_) => AppError::bad_request("webhook.data.invalid")
                .with_detail("paymentRequestId", "must be a positive integer"),
            WebhookError::RefIdMismatch { .. } => AppError::unprocessable("webhook.refid.mismatch"),
            WebhookError::Psp(PspError::NotFound) => AppError::not_found("paylink.id.notfound"),
            WebhookError::Psp(_) | WebhookError::Ledger(_) => {
                AppError::bad_gateway("webhook.downstream.error")
            }
        }
    }
}

/// The PSP calls `/api/rest/v1/webhook/{secret}`; the path secret is the only
/// authentication it supports.
pub async fn webhook(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let expected = state.config.security.fixed_token.webhook.expose_secret();
    if !secure_compare(expected, &secret) {
        tracing::warn!("webhook called with wrong secret");
        return Err(AppError::Unauthorized("invalid webhook secret".to_string()));
    }

    let event: WebhookEventDto = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "webhook body could not be parsed");
        AppError::bad_request("webhook.parse.error")
    })?;

    state.paylinks.handle_webhook(&event).await?;
    Ok(StatusCode::OK)
}
