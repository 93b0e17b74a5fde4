//! HTTP handlers for paylink-service.

pub mod paylinks;
pub mod simulator;
pub mod webhook;

use axum::{http::header, response::IntoResponse, Json};

use crate::dtos::HealthReportDto;
use crate::services::get_metrics;

pub async fn health_check() -> Json<HealthReportDto> {
    Json(HealthReportDto {
        status: "OK".to_string(),
    })
}

/// Prometheus metrics endpoint.
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
