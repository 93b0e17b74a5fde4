use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::middleware::tracing::current_request_id;

/// Field name to list of human readable messages.
pub type ErrorDetails = BTreeMap<String, Vec<String>>;

/// The single HTTP facing error type.
///
/// Every variant renders as an [`ErrorResponse`] whose `message` is a fixed
/// key (e.g. `paylink.data.invalid`) so that user interfaces can translate it.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {message}")]
    BadRequest {
        message: &'static str,
        details: ErrorDetails,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {message}")]
    NotFound {
        message: &'static str,
        details: ErrorDetails,
    },

    #[error("Unprocessable: {message}")]
    Unprocessable {
        message: &'static str,
        details: ErrorDetails,
    },

    #[error("Bad Gateway: {message}")]
    BadGateway {
        message: &'static str,
        details: ErrorDetails,
    },

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: &'static str) -> Self {
        AppError::BadRequest {
            message,
            details: ErrorDetails::new(),
        }
    }

    pub fn not_found(message: &'static str) -> Self {
        AppError::NotFound {
            message,
            details: ErrorDetails::new(),
        }
    }

    pub fn unprocessable(message: &'static str) -> Self {
        AppError::Unprocessable {
            message,
            details: ErrorDetails::new(),
        }
    }

    pub fn bad_gateway(message: &'static str) -> Self {
        AppError::BadGateway {
            message,
            details: ErrorDetails::new(),
        }
    }

    /// Attach a detail message under `field`. No-op for variants without details.
    pub fn with_detail(mut self, field: impl Into<String>, detail: impl Into<String>) -> Self {
        if let Some(details) = self.details_mut() {
            details.entry(field.into()).or_default().push(detail.into());
        }
        self
    }

    pub fn with_details(mut self, extra: ErrorDetails) -> Self {
        if let Some(details) = self.details_mut() {
            for (field, messages) in extra {
                details.entry(field).or_default().extend(messages);
            }
        }
        self
    }

    fn details_mut(&mut self) -> Option<&mut ErrorDetails> {
        match self {
            AppError::BadRequest { details, .. }
            | AppError::NotFound { details, .. }
            | AppError::Unprocessable { details, .. }
            | AppError::BadGateway { details, .. } => Some(details),
            _ => None,
        }
    }

    /// The message key this error renders with.
    pub fn message_key(&self) -> &'static str {
        match self {
            AppError::BadRequest { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Unprocessable { message, .. }
            | AppError::BadGateway { message, .. } => *message,
            AppError::Unauthorized(_) => "auth.unauthorized",
            AppError::InternalError(_) | AppError::ConfigError(_) => "unexpected",
        }
    }
}

/// Convert validator output into keyed details, one entry per failing field.
pub fn details_from_validation(errors: &validator::ValidationErrors) -> ErrorDetails {
    let mut details = ErrorDetails::new();
    for (field, field_errors) in errors.field_errors() {
        let messages = field_errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect::<Vec<_>>();
        details.entry(field.to_string()).or_default().extend(messages);
    }
    details
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub timestamp: String,
    pub requestid: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: ErrorDetails,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.message_key();

        let (status, details) = match self {
            AppError::BadRequest { details, .. } => (StatusCode::BAD_REQUEST, details),
            AppError::NotFound { details, .. } => (StatusCode::NOT_FOUND, details),
            AppError::Unprocessable { details, .. } => (StatusCode::UNPROCESSABLE_ENTITY, details),
            AppError::BadGateway { details, .. } => (StatusCode::BAD_GATEWAY, details),
            AppError::Unauthorized(reason) => {
                let mut details = ErrorDetails::new();
                details.insert("details".to_string(), vec![reason]);
                (StatusCode::UNAUTHORIZED, details)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "unexpected error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetails::new())
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "configuration error while handling request");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorDetails::new())
            }
        };

        let body = ErrorResponse {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            requestid: current_request_id().unwrap_or_default(),
            message: message.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
