//! Payment service provider (PSP) hosting the payment pages.
//!
//! [`PspClient`] talks to the real provider, [`PspSimulator`] stands in for it
//! when no base url is configured.

pub mod client;
pub mod signer;
pub mod simulator;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::null_as_default;

pub use client::PspClient;
pub use signer::{Encoding, RequestSigner};
pub use simulator::PspSimulator;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PspError {
    #[error("payment link id not found")]
    NotFound,

    #[error("downstream unavailable - {0}")]
    Downstream(String),

    #[error("response body status field did not indicate success")]
    NotSuccessful,

    #[error("unexpected number of entries in response data: {0}")]
    UnexpectedShape(usize),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkCreateRequest,
    ) -> Result<PaymentLinkCreated, PspError>;

    async fn query_payment_link(&self, id: u64) -> Result<PaymentLinkQueryResponse, PspError>;

    async fn delete_payment_link(&self, id: u64) -> Result<(), PspError>;

    async fn query_transactions(
        &self,
        time_greater_than: DateTime<Utc>,
        time_less_than: DateTime<Utc>,
    ) -> Result<Vec<TransactionData>, PspError>;
}

/// Everything needed to build the form encoded create request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentLinkCreateRequest {
    pub title: String,
    pub description: String,
    pub psp: u64,
    pub reference_id: String,
    pub order_id: String,
    pub purpose: String,
    /// In cents.
    pub amount: i64,
    /// In percent.
    pub vat_rate: f64,
    pub currency: String,
    pub sku: String,
    pub email: String,
}

type FieldAccessor = fn(&PaymentLinkCreateRequest) -> String;

/// Form fields of the create request in the order the PSP verifies them.
///
/// Both the body and the string that gets signed are built from this list.
pub const CREATE_FIELDS: &[(&str, FieldAccessor)] = &[
    ("title", |r| r.title.clone()),
    ("description", |r| r.description.clone()),
    ("psp", |r| r.psp.to_string()),
    ("referenceId", |r| r.reference_id.clone()),
    ("concardisOrderId", |r| r.order_id.clone()),
    ("purpose", |r| r.purpose.clone()),
    ("amount", |r| r.amount.to_string()),
    ("vatRate", |r| format!("{:.1}", r.vat_rate)),
    ("currency", |r| r.currency.clone()),
    ("sku", |r| r.sku.clone()),
    ("preAuthorization", |_| "0".to_string()),
    ("reservation", |_| "0".to_string()),
    ("fields[email][mandatory]", |_| "1".to_string()),
    ("fields[email][defaultValue]", |r| r.email.clone()),
];

impl PaymentLinkCreateRequest {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        CREATE_FIELDS
            .iter()
            .map(|(key, value)| (*key, value(self)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentLinkCreated {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub reference_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentLinkQueryResponse {
    /// PSP payment link id.
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub reference_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub link: String,
    #[serde(deserialize_with = "null_as_default")]
    pub invoices: Vec<PaymentLinkInvoice>,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "lenient_purpose")]
    pub purpose: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    #[serde(deserialize_with = "lenient_f64")]
    pub vat_rate: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: i64,
}

impl PaymentLinkQueryResponse {
    /// The most recent transaction: last transaction of the last invoice.
    pub fn latest_transaction(&self) -> Option<&TransactionData> {
        self.invoices.last()?.transactions.last()
    }

    /// Purpose texts are keyed by language slot, the first one wins.
    pub fn purpose_text(&self) -> String {
        self.purpose.values().next().cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentLinkInvoice {
    #[serde(deserialize_with = "null_as_default")]
    pub reference_id: String,
    /// The payment link id.
    #[serde(deserialize_with = "null_as_default")]
    pub payment_request_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub transactions: Vec<TransactionData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionData {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    /// `YYYY-MM-DD hh:mm:ss`, the first 10 chars are the effective date.
    #[serde(deserialize_with = "null_as_default")]
    pub time: String,
    /// ISO 639-1 shopper language.
    #[serde(deserialize_with = "null_as_default")]
    pub lang: String,
    #[serde(deserialize_with = "null_as_default")]
    pub page_uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub payment: Payment,
    #[serde(deserialize_with = "null_as_default")]
    pub psp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub psp_id: i64,
    /// `LIVE` or `TEST`
    #[serde(deserialize_with = "null_as_default")]
    pub mode: String,
    #[serde(deserialize_with = "null_as_default")]
    pub reference_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub invoice: Invoice,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Invoice {
    #[serde(deserialize_with = "null_as_default")]
    pub reference_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub payment_request_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub original_amount: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub refunded_amount: i64,
}

/// The PSP sends purpose either as a language keyed object or as plain text.
fn lenient_purpose<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        Value::String(s) if !s.is_empty() => BTreeMap::from([("1".to_string(), s)]),
        _ => BTreeMap::new(),
    })
}

/// Numbers sometimes arrive quoted, e.g. `"vatRate": "19.0"`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> PaymentLinkCreateRequest {
        PaymentLinkCreateRequest {
            title: "Convention Registration".to_string(),
            description: "desc".to_string(),
            psp: 1,
            reference_id: "221216-122218-000001".to_string(),
            order_id: "221216122218000001".to_string(),
            purpose: "fee".to_string(),
            amount: 390,
            vat_rate: 19.0,
            currency: "EUR".to_string(),
            sku: "registration".to_string(),
            email: "someone@example.com".to_string(),
        }
    }

    #[test]
    fn form_fields_follow_the_fixed_order() {
        let keys: Vec<_> = request().form_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "title",
                "description",
                "psp",
                "referenceId",
                "concardisOrderId",
                "purpose",
                "amount",
                "vatRate",
                "currency",
                "sku",
                "preAuthorization",
                "reservation",
                "fields[email][mandatory]",
                "fields[email][defaultValue]",
            ]
        );
    }

    #[test]
    fn vat_rate_has_one_decimal() {
        let fields = request().form_fields();
        let vat = fields.iter().find(|(k, _)| *k == "vatRate").unwrap();
        assert_eq!(vat.1, "19.0");
    }

    #[test]
    fn query_response_tolerates_loose_types() {
        let parsed: PaymentLinkQueryResponse = serde_json::from_value(json!({
            "id": 42,
            "status": "confirmed",
            "referenceId": "221216-122218-000001",
            "purpose": "plain text purpose",
            "vatRate": "19.0",
            "amount": 390,
            "somethingNew": true
        }))
        .unwrap();

        assert_eq!(parsed.purpose_text(), "plain text purpose");
        assert_eq!(parsed.vat_rate, Some(19.0));
        assert!(parsed.invoices.is_empty());
    }

    #[test]
    fn latest_transaction_is_last_of_last_invoice() {
        let tx = |uuid: &str| TransactionData {
            uuid: uuid.to_string(),
            ..Default::default()
        };
        let response = PaymentLinkQueryResponse {
            invoices: vec![
                PaymentLinkInvoice {
                    transactions: vec![tx("a"), tx("b")],
                    ..Default::default()
                },
                PaymentLinkInvoice {
                    transactions: vec![tx("c"), tx("d")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        assert_eq!(response.latest_transaction().unwrap().uuid, "d");
        assert!(PaymentLinkQueryResponse::default()
            .latest_transaction()
            .is_none());
    }
}
