//! Append-only protocol of webhook processing.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ProtocolEntry;

pub use memory::InMemoryAuditLog;
pub use mongo::MongoAuditLog;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuditError {
    #[error("failed to store protocol entry - {0}")]
    Storage(String),
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn write_entry(&self, entry: &ProtocolEntry) -> Result<(), AuditError>;
}
