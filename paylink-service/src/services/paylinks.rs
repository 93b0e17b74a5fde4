//! Payment link orchestration: request validation, link lifecycle at the PSP
//! and the helpers shared with webhook processing.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use service_core::error::{details_from_validation, ErrorDetails};
use service_core::middleware::tracing::current_request_id;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use super::directory::DirectoryError;
use super::notifier::MailSendDto;
use super::psp::{PaymentLinkCreateRequest, PaymentLinkQueryResponse, PspError};
use super::Dependencies;
use crate::config::Config;
use crate::dtos::{PaymentLinkDto, PaymentLinkRequestDto, SUPPORTED_CURRENCY};
use crate::models::{ProtocolEntry, ProtocolKind};

/// Product id of the hosted payment page at the PSP.
const PSP_PRODUCT_ID: u64 = 1;
const SKU: &str = "registration";
const MAX_ORDER_ID_LENGTH: usize = 30;
const REFERENCE_TIMESTAMP_FORMAT: &str = "%y%m%d-%H%M%S";

#[derive(Debug, Error)]
pub enum PaylinkError {
    #[error("invalid payment link request")]
    Invalid(ErrorDetails),

    #[error("no attendee with debitor id {0}")]
    UnknownDebitor(u64),

    #[error(transparent)]
    Directory(DirectoryError),

    #[error(transparent)]
    Psp(#[from] PspError),
}

#[derive(Clone)]
pub struct PaylinkService {
    pub(super) config: Arc<Config>,
    pub(super) deps: Dependencies,
    pub(super) clock: fn() -> DateTime<Utc>,
}

impl PaylinkService {
    pub fn new(config: Arc<Config>, deps: Dependencies) -> Self {
        Self {
            config,
            deps,
            clock: Utc::now,
        }
    }

    /// Replace the time source, used for reference ids and effective dates.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    #[tracing::instrument(skip(self, request), fields(debitor_id = request.debitor_id))]
    pub async fn create_payment_link(
        &self,
        request: &PaymentLinkRequestDto,
    ) -> Result<(PaymentLinkDto, u64), PaylinkError> {
        validate_request(request).map_err(PaylinkError::Invalid)?;

        let attendee = match self.deps.directory.get_attendee(request.debitor_id).await {
            Ok(attendee) => attendee,
            Err(DirectoryError::NotFound) => {
                tracing::warn!("debitor not known to the attendee service");
                return Err(PaylinkError::UnknownDebitor(request.debitor_id));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to look up debitor");
                self.notify(
                    "create-pay-link",
                    &format!("debitor {}", request.debitor_id),
                    &e.to_string(),
                )
                .await;
                return Err(PaylinkError::Directory(e));
            }
        };

        let psp_request = self.create_request(request, attendee.email);
        let created = match self.deps.psp.create_payment_link(&psp_request).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(error = %e, reference_id = %psp_request.reference_id, "failed to create payment link");
                self.notify(
                    "create-pay-link",
                    &format!("refId: {}", psp_request.reference_id),
                    &e.to_string(),
                )
                .await;
                return Err(e.into());
            }
        };

        tracing::info!(paylink_id = created.id, reference_id = %created.reference_id, "payment link created");

        let dto = PaymentLinkDto {
            title: psp_request.title,
            description: psp_request.description,
            reference_id: created.reference_id,
            purpose: psp_request.purpose,
            amount_due: psp_request.amount,
            amount_paid: 0,
            currency: psp_request.currency,
            vat_rate: psp_request.vat_rate,
            link: created.link,
        };
        Ok((dto, created.id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment_link(&self, paylink_id: u64) -> Result<PaymentLinkDto, PaylinkError> {
        let paylink = match self.deps.psp.query_payment_link(paylink_id).await {
            Ok(paylink) => paylink,
            Err(e) => return Err(self.psp_failure("get-pay-link", paylink_id, e).await),
        };

        Ok(dto_from_query(&paylink))
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_payment_link(&self, paylink_id: u64) -> Result<(), PaylinkError> {
        if let Err(e) = self.deps.psp.delete_payment_link(paylink_id).await {
            return Err(self.psp_failure("delete-pay-link", paylink_id, e).await);
        }

        tracing::info!(paylink_id, "payment link deleted");
        Ok(())
    }

    /// Send an operator alert. Failures are logged and never propagate.
    pub async fn notify(&self, operation: &str, reference: &str, status: &str) {
        let recipient = &self.config.notify.error_notify_mail;
        if recipient.is_empty() {
            tracing::error!(
                operation,
                reference,
                status,
                "error notification mail cannot be sent - no address configured"
            );
            return;
        }

        tracing::warn!(operation, reference, status, "sending error notification mail");
        let mail = MailSendDto::error_notification(recipient, operation, reference, status);
        if let Err(e) = self.deps.notifier.send(&mail).await {
            tracing::error!(
                error = %e,
                operation,
                reference,
                status,
                "failed to send error notification mail"
            );
        }
    }

    /// Append to the audit log. A failed write is logged and otherwise ignored.
    pub(super) async fn protocol(
        &self,
        kind: ProtocolKind,
        reference_id: &str,
        paylink_id: u64,
        message: &str,
        details: String,
    ) {
        let entry = ProtocolEntry::new(
            kind,
            reference_id,
            paylink_id,
            message,
            details,
            current_request_id().unwrap_or_default(),
        );
        if let Err(e) = self.deps.audit.write_entry(&entry).await {
            tracing::error!(error = %e, reference_id, message, "failed to write protocol entry");
        }
    }

    pub(super) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn create_request(&self, request: &PaymentLinkRequestDto, email: String) -> PaymentLinkCreateRequest {
        let reference_id = reference_id(self.now(), request.debitor_id);
        let invoice = &self.config.invoice;
        PaymentLinkCreateRequest {
            title: invoice.title.clone(),
            description: invoice.description.clone(),
            psp: PSP_PRODUCT_ID,
            order_id: order_id(&reference_id),
            reference_id,
            purpose: invoice.purpose.clone(),
            amount: request.amount_due,
            vat_rate: request.vat_rate,
            currency: request.currency.clone(),
            sku: SKU.to_string(),
            email,
        }
    }

    /// Not-found passes through silently, anything else alerts an operator.
    async fn psp_failure(&self, operation: &str, paylink_id: u64, err: PspError) -> PaylinkError {
        if err != PspError::NotFound {
            tracing::error!(error = %err, paylink_id, operation, "PSP call failed");
            self.notify(operation, &format!("paylink id {}", paylink_id), &err.to_string())
                .await;
        }
        PaylinkError::Psp(err)
    }
}

/// Field level validation of a create request. Every failing field is reported.
pub fn validate_request(request: &PaymentLinkRequestDto) -> Result<(), ErrorDetails> {
    let mut errors = match request.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => errors,
    };
    if request.currency != SUPPORTED_CURRENCY {
        errors.add(
            "currency",
            ValidationError::new("currency")
                .with_message(Cow::Borrowed("right now, only EUR is supported")),
        );
    }

    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(details_from_validation(&errors))
    }
}

/// `<yymmdd-hhmmss>-<debitor id, 6 digits>`, the correlation key of a link.
pub fn reference_id(now: DateTime<Utc>, debitor_id: u64) -> String {
    format!("{}-{:06}", now.format(REFERENCE_TIMESTAMP_FORMAT), debitor_id)
}

pub fn order_id(reference_id: &str) -> String {
    reference_id
        .chars()
        .filter(|c| *c != '-')
        .take(MAX_ORDER_ID_LENGTH)
        .collect()
}

fn dto_from_query(paylink: &PaymentLinkQueryResponse) -> PaymentLinkDto {
    let amount_paid = paylink
        .invoices
        .iter()
        .flat_map(|invoice| invoice.transactions.iter())
        .filter(|tx| tx.status == "confirmed")
        .map(|tx| tx.amount)
        .sum();

    PaymentLinkDto {
        title: paylink.title.clone(),
        description: paylink.description.clone(),
        reference_id: paylink.reference_id.clone(),
        purpose: paylink.purpose_text(),
        amount_due: paylink.amount,
        amount_paid,
        currency: paylink.currency.clone(),
        vat_rate: paylink.vat_rate.unwrap_or_default(),
        link: paylink.link.clone(),
    }
}
