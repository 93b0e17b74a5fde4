//! Request and response bodies of the REST api.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::null_as_default;

pub const SUPPORTED_CURRENCY: &str = "EUR";

/// Body of `POST /api/rest/v1/paylinks`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentLinkRequestDto {
    /// The badge number of the attendee to bill.
    #[serde(default)]
    #[validate(range(
        min = 1,
        message = "field must be a positive integer (the badge number to bill for)"
    ))]
    pub debitor_id: u64,

    /// Amount to bill in cents.
    #[serde(default)]
    #[validate(range(min = 1, message = "must be a positive integer (the amount to bill)"))]
    pub amount_due: i64,

    #[serde(default)]
    pub currency: String,

    /// Applicable VAT in percent.
    #[serde(default)]
    #[validate(range(
        min = 0.0,
        max = 50.0,
        message = "vat rate should be provided in percent and must be between 0.0 and 50.0"
    ))]
    pub vat_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentLinkDto {
    pub title: String,
    pub description: String,
    pub reference_id: String,
    pub purpose: String,
    pub amount_due: i64,
    pub amount_paid: i64,
    pub currency: String,
    pub vat_rate: f64,
    pub link: String,
}

/// Webhook payload sent by the PSP. Only the fields needed to find the
/// payment link are read, everything else is ignored. `null` counts as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEventDto {
    #[serde(default, deserialize_with = "null_as_default")]
    pub transaction: WebhookEventTransaction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEventTransaction {
    /// Id of the PSP transaction, not of the payment link.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub invoice: WebhookEventInvoice,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventInvoice {
    #[serde(default, deserialize_with = "null_as_default")]
    pub number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reference_id: String,
    /// Id of the payment link concerned.
    #[serde(default, deserialize_with = "null_as_default")]
    pub payment_request_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReportDto {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_payload_tolerates_nulls() {
        let event: WebhookEventDto = serde_json::from_str(
            r#"{"transaction":{"id":1,"invoice":{"number":null,"referenceId":"221216-122218-000001","paymentRequestId":42}}}"#,
        )
        .unwrap();

        assert_eq!(event.transaction.invoice.number, "");
        assert_eq!(event.transaction.invoice.reference_id, "221216-122218-000001");
        assert_eq!(event.transaction.invoice.payment_request_id, 42);
    }

    #[test]
    fn webhook_payload_with_null_transaction_is_empty() {
        let event: WebhookEventDto =
            serde_json::from_str(r#"{"transaction":null,"unknown":[1,2]}"#).unwrap();

        assert_eq!(event.transaction.invoice.payment_request_id, 0);
    }
}
