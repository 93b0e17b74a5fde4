//! Operator alerts sent through the mail service.

pub mod client;
pub mod simulator;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::MailClient;
pub use simulator::MailSimulator;

pub const ERROR_TEMPLATE_ID: &str = "payment-cncrd-adapter-error";
pub const ERROR_TEMPLATE_LANG: &str = "en-US";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("mail service unavailable - {0}")]
    Downstream(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: &MailSendDto) -> Result<(), NotifyError>;
}

/// Templated mail request understood by the mail service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MailSendDto {
    #[serde(rename = "cid")]
    pub common_id: String,
    pub lang: String,
    pub variables: BTreeMap<String, String>,
    pub to: Vec<String>,
}

impl MailSendDto {
    pub fn error_notification(
        recipient: &str,
        operation: &str,
        reference_id: &str,
        status: &str,
    ) -> Self {
        Self {
            common_id: ERROR_TEMPLATE_ID.to_string(),
            lang: ERROR_TEMPLATE_LANG.to_string(),
            variables: BTreeMap::from([
                ("operation".to_string(), operation.to_string()),
                ("referenceId".to_string(), reference_id.to_string()),
                ("status".to_string(), status.to_string()),
            ]),
            to: vec![recipient.to_string()],
        }
    }

    pub fn variable(&self, name: &str) -> &str {
        self.variables.get(name).map(String::as_str).unwrap_or_default()
    }
}
