use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, Secret};
use service_core::http::DownstreamClient;

use super::{AttendeeDirectory, AttendeeDto, DirectoryError};
use crate::services::API_KEY_HEADER;

#[derive(Clone)]
pub struct DirectoryClient {
    base_url: String,
    api_token: Secret<String>,
    downstream: DownstreamClient,
}

impl DirectoryClient {
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
impl AttendeeDirectory for DirectoryClient {
    #[tracing::instrument(skip(self))]
    async fn get_attendee(&self, id: u64) -> Result<AttendeeDto, DirectoryError> {
        let url = format!("{}/api/rest/v1/attendees/{}", self.base_url, id);
        let request = self
            .downstream
            .request(Method::GET, &url)
            .header(API_KEY_HEADER, self.api_token.expose_secret());

        let response = self.downstream.send(request).await.map_err(|e| {
            tracing::error!(error = %e, "attendee service request failed");
            DirectoryError::Downstream(e.to_string())
        })?;

        match response.status() {
            StatusCode::OK => response.json::<AttendeeDto>().await.map_err(|e| {
                tracing::error!(error = %e, "failed to parse attendee");
                DirectoryError::Downstream(e.to_string())
            }),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound),
            status => {
                tracing::error!(status = %status, "unexpected attendee service http status");
                Err(DirectoryError::Downstream(format!(
                    "unexpected http status {}",
                    status.as_u16()
                )))
            }
        }
    }
}
