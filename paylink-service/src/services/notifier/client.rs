use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, Secret};
use service_core::http::DownstreamClient;

use super::{MailSendDto, NotifyError, Notifier};
use crate::services::API_KEY_HEADER;

#[derive(Clone)]
pub struct MailClient {
    base_url: String,
    api_token: Secret<String>,
    downstream: DownstreamClient,
}

impl MailClient {
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
}

#[async_trait]
impl Notifier for MailClient {
    #[tracing::instrument(skip(self, mail), fields(template = %mail.common_id))]
    async fn send(&self, mail: &MailSendDto) -> Result<(), NotifyError> {
        let url = format!("{}/api/v1/mail", self.base_url);
        let request = self
            .downstream
            .request(Method::POST, &url)
            .header(API_KEY_HEADER, self.api_token.expose_secret())
            .json(mail);

        let response = self
            .downstream
            .send(request)
            .await
            .map_err(|e| NotifyError::Downstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Downstream(format!(
                "unexpected http status {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
