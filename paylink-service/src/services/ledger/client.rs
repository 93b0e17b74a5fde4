use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::http::DownstreamClient;

use super::{Ledger, LedgerError, Transaction};
use crate::services::psp::Encoding;
use crate::services::API_KEY_HEADER;

#[derive(Debug, Deserialize)]
struct TransactionList {
    #[serde(default)]
    payload: Vec<Transaction>,
}

#[derive(Clone)]
pub struct LedgerClient {
    base_url: String,
    api_token: Secret<String>,
    downstream: DownstreamClient,
}

impl LedgerClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Secret<String>,
        downstream: DownstreamClient,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_token,
            downstream,
        }
    }

    fn transactions_url(&self) -> String {
        format!("{}/api/rest/v1/transactions", self.base_url)
    }

    async fn perform(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), LedgerError> {
        let request = request.header(API_KEY_HEADER, self.api_token.expose_secret());
        let response = self.downstream.send(request).await.map_err(|e| {
            tracing::error!(error = %e, "ledger request failed");
            LedgerError::Downstream(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::Downstream(e.to_string()))?;

        tracing::debug!(status = %status, body = %body, "ledger response");

        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound);
        }
        if !status.is_success() {
            tracing::error!(status = %status, "unexpected ledger http status");
            return Err(LedgerError::Downstream(format!(
                "unexpected http status {}",
                status.as_u16()
            )));
        }
        Ok((status, body))
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    #[tracing::instrument(skip(self, transaction), fields(reference_id = %transaction.transaction_identifier))]
    async fn add_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let request = self
            .downstream
            .request(Method::POST, &self.transactions_url())
            .json(transaction);
        self.perform(request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, transaction), fields(reference_id = %transaction.transaction_identifier))]
    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let url = format!(
            "{}/{}",
            self.transactions_url(),
            Encoding::Path.escape(&transaction.transaction_identifier)
        );
        let request = self.downstream.request(Method::PUT, &url).json(transaction);
        self.perform(request).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_transaction_by_reference_id(
        &self,
        reference_id: &str,
    ) -> Result<Transaction, LedgerError> {
        let request = self
            .downstream
            .request(Method::GET, &self.transactions_url())
            .query(&[("transaction_identifier", reference_id)]);
        let (_, body) = self.perform(request).await?;

        let list: TransactionList = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "failed to parse ledger response");
            LedgerError::Downstream(format!("failed to parse response body: {}", e))
        })?;

        list.payload
            .into_iter()
            .next()
            .ok_or(LedgerError::NotFound)
    }
}
