//! Reconciliation of PSP webhook events with the ledger.
//!
//! The webhook payload is never trusted beyond the payment link id: the link
//! is fetched from the PSP again and its status decides what happens. The
//! ledger's `valid` status is the idempotency guard against repeated or
//! reordered deliveries.

use thiserror::Error;

use super::ledger::{
    Amount, LedgerError, PaymentMethod, Transaction, TransactionStatus, TransactionType,
};
use super::metrics::record_webhook_outcome;
use super::psp::{PaymentLinkQueryResponse, PspError};
use super::PaylinkService;
use crate::dtos::WebhookEventDto;
use crate::models::ProtocolKind;

/// Invoice number sent by the "test" button in the PSP backoffice.
pub const TEST_BUTTON_INVOICE_NUMBER: &str = "123456";

const OPERATION: &str = "webhook";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid payment link id {0}")]
    InvalidPaylinkId(i64),

    #[error("reference id mismatch: webhook claims {claimed}, payment link has {actual}")]
    RefIdMismatch { claimed: String, actual: String },

    #[error(transparent)]
    Psp(PspError),

    #[error(transparent)]
    Ledger(LedgerError),
}

/// How a webhook was resolved. All of these are reported as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    TestButton,
    ForeignReferencePrefix,
    /// `cancelled` or `declined`, nothing to book.
    Ignored,
    /// A status an operator has to look at.
    NeedsAttention,
    Created,
    Updated,
    AlreadyValid,
}

impl WebhookOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookOutcome::TestButton => "test-button",
            WebhookOutcome::ForeignReferencePrefix => "ref-id-prefix",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::NeedsAttention => "needs-attention",
            WebhookOutcome::Created => "created",
            WebhookOutcome::Updated => "updated",
            WebhookOutcome::AlreadyValid => "already-valid",
        }
    }
}

impl PaylinkService {
    #[tracing::instrument(
        skip(self, event),
        fields(
            transaction_id = event.transaction.id,
            paylink_id = event.transaction.invoice.payment_request_id,
            reference_id = %event.transaction.invoice.reference_id,
        )
    )]
    pub async fn handle_webhook(
        &self,
        event: &WebhookEventDto,
    ) -> Result<WebhookOutcome, WebhookError> {
        tracing::info!("webhook received");
        let result = self.reconcile(event).await;
        match &result {
            Ok(outcome) => {
                tracing::info!(outcome = outcome.as_str(), "webhook processed");
                record_webhook_outcome(outcome.as_str());
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook processing failed");
                record_webhook_outcome("error");
            }
        }
        result
    }

    async fn reconcile(&self, event: &WebhookEventDto) -> Result<WebhookOutcome, WebhookError> {
        let invoice = &event.transaction.invoice;

        let paylink_id = match u64::try_from(invoice.payment_request_id) {
            Ok(id) if id > 0 => id,
            _ => {
                if invoice.number == TEST_BUTTON_INVOICE_NUMBER && invoice.payment_request_id == 0 {
                    tracing::warn!(
                        "webhook with paylink id 0 and invoice number 123456, probably the test button in the PSP backoffice"
                    );
                    self.notify(OPERATION, "paylinkId 0 test button", "api-error")
                        .await;
                    return Ok(WebhookOutcome::TestButton);
                }

                tracing::error!("webhook called with invalid paylink id");
                self.notify(
                    OPERATION,
                    &format!("paylinkId: {}", invoice.payment_request_id),
                    "api-error",
                )
                .await;
                return Err(WebhookError::InvalidPaylinkId(invoice.payment_request_id));
            }
        };

        let paylink = match self.deps.psp.query_payment_link(paylink_id).await {
            Ok(paylink) => paylink,
            Err(e) => {
                tracing::error!(error = %e, "cannot query payment link from the PSP");
                self.protocol(
                    ProtocolKind::Error,
                    &invoice.reference_id,
                    paylink_id,
                    "webhook query-pay-link failed",
                    e.to_string(),
                )
                .await;
                self.notify(
                    OPERATION,
                    &format!("paylinkId: {}", paylink_id),
                    "query-pay-link-err",
                )
                .await;
                return Err(WebhookError::Psp(e));
            }
        };

        if paylink.reference_id != invoice.reference_id {
            tracing::error!(
                paylink_reference_id = %paylink.reference_id,
                "webhook reference id does not match the payment link"
            );
            self.protocol(
                ProtocolKind::Error,
                &invoice.reference_id,
                paylink_id,
                "webhook ref-id-mismatch",
                format!(
                    "response ref-id={} vs webhook ref-id={}",
                    paylink.reference_id, invoice.reference_id
                ),
            )
            .await;
            self.notify(
                OPERATION,
                &format!("paylinkId: {}", paylink_id),
                "ref-id-mismatch",
            )
            .await;
            return Err(WebhookError::RefIdMismatch {
                claimed: invoice.reference_id.clone(),
                actual: paylink.reference_id,
            });
        }

        let prefix = &self.config.payment.required_ref_id_prefix;
        if !prefix.is_empty() && !paylink.reference_id.starts_with(prefix.as_str()) {
            tracing::warn!("webhook for a reference id with a foreign prefix");
            self.protocol(
                ProtocolKind::Error,
                &invoice.reference_id,
                paylink_id,
                "webhook ref-id-prefix",
                format!("ref-id={}", paylink.reference_id),
            )
            .await;
            self.notify(OPERATION, &paylink.reference_id, "ref-id-prefix")
                .await;
            return Ok(WebhookOutcome::ForeignReferencePrefix);
        }

        tracing::info!(
            status = %paylink.status,
            amount = paylink.amount,
            "webhook for payment link"
        );
        self.protocol(
            ProtocolKind::Success,
            &paylink.reference_id,
            paylink_id,
            "webhook query-pay-link",
            format!("status={} amount={}", paylink.status, paylink.amount),
        )
        .await;

        match paylink.status.as_str() {
            "cancelled" | "declined" => {
                tracing::info!(status = %paylink.status, "irrelevant status, ignoring as successful");
                return Ok(WebhookOutcome::Ignored);
            }
            "confirmed" => {}
            other => {
                self.notify(OPERATION, &paylink.reference_id, other).await;
                return Ok(WebhookOutcome::NeedsAttention);
            }
        }

        match self
            .deps
            .ledger
            .get_transaction_by_reference_id(&paylink.reference_id)
            .await
        {
            Ok(existing) => self.update_transaction(&paylink, existing).await,
            Err(LedgerError::NotFound) => {
                tracing::error!("reference id unknown to the ledger, creating a new transaction");
                self.create_transaction(&paylink).await
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to look up ledger transaction");
                self.notify(
                    OPERATION,
                    &format!("refId: {}", paylink.reference_id),
                    "ledger-lookup-err",
                )
                .await;
                Err(WebhookError::Ledger(e))
            }
        }
    }

    async fn create_transaction(
        &self,
        paylink: &PaymentLinkQueryResponse,
    ) -> Result<WebhookOutcome, WebhookError> {
        let debitor_id = match debitor_id_from_reference_id(&paylink.reference_id) {
            Some(id) => id,
            None => {
                tracing::warn!("cannot parse debitor id from reference id, booking for debitor 0");
                self.notify(
                    OPERATION,
                    &format!("refId: {}", paylink.reference_id),
                    "parse-refid-err",
                )
                .await;
                0
            }
        };

        let effective_date = self.effective_date(paylink);
        let transaction = Transaction {
            debitor_id,
            transaction_identifier: paylink.reference_id.clone(),
            transaction_type: TransactionType::Payment,
            method: PaymentMethod::Credit,
            amount: Amount {
                currency: paylink.currency.clone(),
                gross_cent: paylink.amount,
                vat_rate: paylink.vat_rate.unwrap_or_default(),
            },
            comment: format!("{} (auto created)", order_comment(paylink)),
            status: TransactionStatus::Pending,
            due_date: effective_date.clone(),
            effective_date,
            ..Default::default()
        };

        if let Err(e) = self.deps.ledger.add_transaction(&transaction).await {
            tracing::error!(
                error = %e,
                "could not create the missing transaction in the ledger, money received for an unknown reason"
            );
            self.notify(
                OPERATION,
                &format!("refId: {}", paylink.reference_id),
                "create-missing-err",
            )
            .await;
            return Err(WebhookError::Ledger(e));
        }
        Ok(WebhookOutcome::Created)
    }

    async fn update_transaction(
        &self,
        paylink: &PaymentLinkQueryResponse,
        mut transaction: Transaction,
    ) -> Result<WebhookOutcome, WebhookError> {
        if transaction.status == TransactionStatus::Valid {
            tracing::warn!("transaction already valid, not updating");
            self.notify(
                OPERATION,
                &format!("refId: {}", paylink.reference_id),
                "abort-update-for-valid",
            )
            .await;
            return Ok(WebhookOutcome::AlreadyValid);
        }

        transaction.amount.gross_cent = paylink.amount;
        transaction.amount.currency = paylink.currency.clone();
        transaction.status = TransactionStatus::Valid;
        transaction.effective_date = self.effective_date(paylink);
        transaction.comment = order_comment(paylink);

        if let Err(e) = self.deps.ledger.update_transaction(&transaction).await {
            tracing::error!(error = %e, "unable to update ledger transaction");
            self.notify(
                OPERATION,
                &format!("refId: {}", paylink.reference_id),
                "update-tx-err",
            )
            .await;
            return Err(WebhookError::Ledger(e));
        }
        Ok(WebhookOutcome::Updated)
    }

    /// Date of the most recent PSP transaction, today if there is none.
    fn effective_date(&self, paylink: &PaymentLinkQueryResponse) -> String {
        paylink
            .latest_transaction()
            .and_then(|tx| tx.time.get(..10))
            .map(str::to_string)
            .unwrap_or_else(|| self.now().format(ISO_DATE_FORMAT).to_string())
    }
}

fn order_comment(paylink: &PaymentLinkQueryResponse) -> String {
    let uuid = paylink
        .latest_transaction()
        .map(|tx| tx.uuid.as_str())
        .filter(|uuid| !uuid.is_empty())
        .unwrap_or("unknown");
    format!("CC orderId {}", uuid)
}

/// Ledger generated reference ids look like `<prefix>-<debitor>-<mmdd>-<hhmmss>-<random>`.
fn debitor_id_from_reference_id(reference_id: &str) -> Option<u64> {
    let tokens: Vec<&str> = reference_id.split('-').collect();
    if tokens.len() != 5 {
        return None;
    }
    tokens[1].parse::<u32>().ok().map(u64::from)
}
