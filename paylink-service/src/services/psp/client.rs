use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::CONTENT_TYPE, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use service_core::http::DownstreamClient;

use crate::utils::null_as_default;

use super::signer::{Encoding, RequestSigner};
use super::{
    PaymentLinkCreateRequest, PaymentLinkCreated, PaymentLinkQueryResponse, PaymentProvider,
    PspError, TransactionData,
};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const TRANSACTION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default, deserialize_with = "null_as_default")]
    status: String,
    #[serde(default = "Option::default")]
    data: Option<Vec<T>>,
}

/// HTTP client for the PSP invoice api.
#[derive(Clone)]
pub struct PspClient {
    base_url: String,
    instance: String,
    signer: RequestSigner,
    downstream: DownstreamClient,
}

impl PspClient {
    pub fn new(
        base_url: impl Into<String>,
        instance: impl Into<String>,
        signer: RequestSigner,
        downstream: DownstreamClient,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            instance: instance.into(),
            signer,
            downstream,
        }
    }

    fn url(&self, resource: &str, id: Option<u64>) -> String {
        let instance = Encoding::Query.escape(&self.instance);
        match id {
            Some(id) => format!(
                "{}/v1.0/{}/{}/?instance={}",
                self.base_url, resource, id, instance
            ),
            None => format!("{}/v1.0/{}/?instance={}", self.base_url, resource, instance),
        }
    }

    async fn perform(
        &self,
        method: Method,
        url: &str,
        body: String,
    ) -> Result<(StatusCode, String), PspError> {
        let request = self
            .downstream
            .request(method.clone(), url)
            .header(CONTENT_TYPE, FORM_URLENCODED)
            .body(body);

        let response = self.downstream.send(request).await.map_err(|e| {
            tracing::error!(error = %e, method = %method, "PSP request failed");
            PspError::Downstream(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::error!(error = %e, status = %status, "failed to read PSP response body");
            PspError::Downstream(e.to_string())
        })?;

        tracing::debug!(status = %status, method = %method, body = %body, "PSP response");

        if status == StatusCode::NOT_FOUND {
            return Err(PspError::NotFound);
        }
        if status.as_u16() >= 300 {
            tracing::error!(status = %status, method = %method, "unexpected PSP http status");
            return Err(PspError::Downstream(format!(
                "unexpected http status {}",
                status.as_u16()
            )));
        }

        Ok((status, body))
    }

    fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, PspError> {
        let envelope: Envelope<T> = serde_json::from_str(body).map_err(|e| {
            tracing::error!(error = %e, "failed to parse PSP response body");
            PspError::Downstream(format!("failed to parse response body: {}", e))
        })?;

        if envelope.status != "success" {
            tracing::error!(status = %envelope.status, "PSP response status was not success");
            return Err(PspError::NotSuccessful);
        }
        Ok(envelope.data.unwrap_or_default())
    }

    fn single<T>(mut data: Vec<T>) -> Result<T, PspError> {
        if data.len() != 1 {
            tracing::error!(entries = data.len(), "PSP response had unexpected shape");
            return Err(PspError::UnexpectedShape(data.len()));
        }
        Ok(data.remove(0))
    }
}

#[async_trait]
impl PaymentProvider for PspClient {
    #[tracing::instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn create_payment_link(
        &self,
        request: &PaymentLinkCreateRequest,
    ) -> Result<PaymentLinkCreated, PspError> {
        let body = self.signer.signed_body(&request.form_fields())?;
        let (_, response) = self
            .perform(Method::POST, &self.url("Invoice", None), body)
            .await?;

        let created: PaymentLinkCreated = Self::single(Self::parse_envelope(&response)?)?;
        tracing::info!(paylink_id = created.id, "payment link created");
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn query_payment_link(&self, id: u64) -> Result<PaymentLinkQueryResponse, PspError> {
        let body = self.signer.signed_body::<&str, &str>(&[])?;
        let (_, response) = self
            .perform(Method::GET, &self.url("Invoice", Some(id)), body)
            .await?;

        Self::single(Self::parse_envelope(&response)?)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_payment_link(&self, id: u64) -> Result<(), PspError> {
        let body = self.signer.signed_body::<&str, &str>(&[])?;
        self.perform(Method::DELETE, &self.url("Invoice", Some(id)), body)
            .await?;
        tracing::info!(paylink_id = id, "payment link deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn query_transactions(
        &self,
        time_greater_than: DateTime<Utc>,
        time_less_than: DateTime<Utc>,
    ) -> Result<Vec<TransactionData>, PspError> {
        let fields = [
            (
                "filterDatetimeUtcGreaterThan",
                time_greater_than.format(TRANSACTION_TIME_FORMAT).to_string(),
            ),
            (
                "filterDatetimeUtcLessThan",
                time_less_than.format(TRANSACTION_TIME_FORMAT).to_string(),
            ),
        ];
        let body = self.signer.signed_body(&fields)?;
        let (_, response) = self
            .perform(Method::GET, &self.url("Transaction", None), body)
            .await?;

        Self::parse_envelope(&response)
    }
}
