//! Attendee directory, consulted for billing details when creating a link.

pub mod client;
pub mod simulator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::DirectoryClient;
pub use simulator::DirectorySimulator;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("attendee not found")]
    NotFound,

    #[error("attendee service unavailable - {0}")]
    Downstream(String),
}

#[async_trait]
pub trait AttendeeDirectory: Send + Sync {
    async fn get_attendee(&self, id: u64) -> Result<AttendeeDto, DirectoryError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendeeDto {
    pub id: u64,
    pub nickname: String,
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub zip: String,
    pub city: String,
    pub country: String,
    pub email: String,
    pub registration_language: String,
}
