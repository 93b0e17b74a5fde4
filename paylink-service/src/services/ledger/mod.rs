//! The internal transaction ledger (payment service), system of record for
//! money owed and paid.

pub mod client;
pub mod simulator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::LedgerClient;
pub use simulator::{LedgerCall, LedgerSimulator};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("no transaction with this reference id")]
    NotFound,

    #[error("ledger unavailable - {0}")]
    Downstream(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn add_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError>;

    async fn get_transaction_by_reference_id(
        &self,
        reference_id: &str,
    ) -> Result<Transaction, LedgerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Due,
    Payment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Credit,
    Cash,
    Paypal,
    Transfer,
    Internal,
    Gift,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Tentative,
    Pending,
    Valid,
    Deleted,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Amount {
    pub currency: String,
    pub gross_cent: i64,
    pub vat_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusChange {
    pub status: TransactionStatus,
    pub comment: String,
    pub changed_by: String,
    pub change_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub debitor_id: u64,
    /// Equal to the payment link reference id.
    pub transaction_identifier: String,
    pub transaction_type: TransactionType,
    pub method: PaymentMethod,
    pub amount: Amount,
    pub comment: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub payment_start_url: String,
    /// ISO date, `YYYY-MM-DD`.
    pub effective_date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub due_date: String,
    pub status_history: Vec<StatusChange>,
}
