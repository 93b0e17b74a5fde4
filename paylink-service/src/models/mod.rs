use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Success,
    Error,
}

/// One audit record of webhook processing. Written once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolEntry {
    pub reference_id: String,
    /// PSP side payment link id.
    pub api_id: u64,
    pub kind: ProtocolKind,
    pub message: String,
    pub details: String,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

impl ProtocolEntry {
    pub fn new(
        kind: ProtocolKind,
        reference_id: impl Into<String>,
        api_id: u64,
        message: impl Into<String>,
        details: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            reference_id: reference_id.into(),
            api_id,
            kind,
            message: message.into(),
            details: details.into(),
            request_id: request_id.into(),
            created_at: Utc::now(),
        }
    }
}
