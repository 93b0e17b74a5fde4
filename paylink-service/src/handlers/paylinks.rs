use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{PaymentLinkDto, PaymentLinkRequestDto};
use crate::middleware::api_key::ApiToken;
use crate::services::psp::PspError;
use crate::services::PaylinkError;
use crate::AppState;

impl From<PaylinkError> for AppError {
    fn from(err: PaylinkError) -> Self {
        match err {
            PaylinkError::Invalid(details) => {
                AppError::bad_request("paylink.data.invalid").with_details(details)
            }
            PaylinkError::UnknownDebitor(_) => AppError::bad_request("paylink.data.invalid")
                .with_detail("debitor_id", "no attendee with this badge number"),
            PaylinkError::Directory(_) => AppError::bad_gateway("attsrv.downstream.error"),
            PaylinkError::Psp(PspError::NotFound) => AppError::not_found("paylink.id.notfound"),
            PaylinkError::Psp(_) => AppError::bad_gateway("paylink.downstream.error"),
        }
    }
}

pub async fn create_paylink(
    _token: ApiToken,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: PaymentLinkRequestDto = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "paylink body could not be parsed");
        AppError::bad_request("paylink.parse.error")
    })?;

    let (dto, id) = state.paylinks.create_payment_link(&request).await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/api/rest/v1/paylinks/{}", id))],
        Json(dto),
    ))
}

pub async fn get_paylink(
    _token: ApiToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentLinkDto>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.paylinks.get_payment_link(id).await?))
}

pub async fn delete_paylink(
    _token: ApiToken,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state.paylinks.delete_payment_link(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(raw: &str) -> Result<u64, AppError> {
    raw.parse::<u64>().map_err(|_| {
        tracing::warn!(id = %raw, "received invalid paylink id");
        AppError::bad_request("paylink.id.invalid")
            .with_detail("id", "must be a non-negative integer")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::DirectoryError;

    #[test]
    fn errors_map_to_message_keys() {
        let cases = [
            (
                PaylinkError::UnknownDebitor(3),
                "paylink.data.invalid",
            ),
            (
                PaylinkError::Directory(DirectoryError::Downstream("x".to_string())),
                "attsrv.downstream.error",
            ),
            (PaylinkError::Psp(PspError::NotFound), "paylink.id.notfound"),
            (
                PaylinkError::Psp(PspError::UnexpectedShape(2)),
                "paylink.downstream.error",
            ),
        ];

        for (err, key) in cases {
            assert_eq!(AppError::from(err).message_key(), key);
        }
    }

    #[test]
    fn ids_must_be_numeric() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(
            parse_id("-1").unwrap_err().message_key(),
            "paylink.id.invalid"
        );
        assert!(parse_id("abc").is_err());
    }
}
