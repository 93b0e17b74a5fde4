use async_trait::async_trait;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    options::IndexOptions,
    Client as MongoClient, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::{AuditError, AuditLog};
use crate::models::{ProtocolEntry, ProtocolKind};

const COLLECTION: &str = "protocol_entries";

/// Stored form of a [`ProtocolEntry`], with a native bson timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProtocolDocument {
    reference_id: String,
    api_id: i64,
    kind: ProtocolKind,
    message: String,
    details: String,
    request_id: String,
    created_at: BsonDateTime,
}

impl From<&ProtocolEntry> for ProtocolDocument {
    fn from(entry: &ProtocolEntry) -> Self {
        Self {
            reference_id: entry.reference_id.clone(),
            api_id: i64::try_from(entry.api_id).unwrap_or(i64::MAX),
            kind: entry.kind,
            message: entry.message.clone(),
            details: entry.details.clone(),
            request_id: entry.request_id.clone(),
            created_at: BsonDateTime::from_chrono(entry.created_at),
        }
    }
}

#[derive(Clone)]
pub struct MongoAuditLog {
    entries: Collection<ProtocolDocument>,
}

impl MongoAuditLog {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            AppError::InternalError(anyhow::anyhow!(e.to_string()))
        })?;

        let log = Self {
            entries: client.database(database).collection(COLLECTION),
        };
        log.initialize_indexes().await?;
        Ok(log)
    }

    async fn initialize_indexes(&self) -> Result<(), AppError> {
        let reference_id_index = IndexModel::builder()
            .keys(doc! { "reference_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("reference_id_idx".to_string())
                    .build(),
            )
            .build();

        self.entries
            .create_index(reference_id_index, None)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create reference_id index");
                AppError::InternalError(anyhow::anyhow!(e.to_string()))
            })?;

        tracing::info!(collection = COLLECTION, "MongoDB indexes ready");
        Ok(())
    }
}

#[async_trait]
impl AuditLog for MongoAuditLog {
    async fn write_entry(&self, entry: &ProtocolEntry) -> Result<(), AuditError> {
        self.entries
            .insert_one(ProtocolDocument::from(entry), None)
            .await
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(())
    }
}
