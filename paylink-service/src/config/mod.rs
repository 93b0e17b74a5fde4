use std::time::Duration;

use anyhow::anyhow;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config::{load, ConfigSource};
use service_core::error::{AppError, ErrorDetails};
use service_core::http::CircuitBreakerConfig;

pub const CONFIG_FILE_ENV: &str = "PAYLINK_CONFIG";
pub const ENV_PREFIX: &str = "PAYLINK";

const MIN_TOKEN_LENGTH: usize = 16;

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub invoice: InvoiceConfig,
    pub database: DatabaseConfig,
    pub notify: NotifyConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub payment: PaymentConfig,
}

/// Downstream locations. An empty base url selects the in-memory simulator.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// My own public base url, without a trailing slash.
    pub public_url: String,
    /// Ledger (payment service) base url.
    pub payment_service: String,
    pub attendee_service: String,
    pub mail_service: String,
    /// PSP base url, e.g. https://api.pay-link.eu
    pub psp_downstream: String,
    pub psp_instance: String,
    pub psp_api_secret: Secret<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "paylink-service".to_string(),
            public_url: String::new(),
            payment_service: String::new(),
            attendee_service: String::new(),
            mail_service: String::new(),
            psp_downstream: String::new(),
            psp_instance: String::new(),
            psp_api_secret: Secret::new(String::new()),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub read_timeout_seconds: u64,
    pub write_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            read_timeout_seconds: 5,
            write_timeout_seconds: 5,
            idle_timeout_seconds: 5,
            shutdown_grace_seconds: 5,
        }
    }
}

impl ServerConfig {
    /// Upper bound for reading the request and writing the response.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds + self.write_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LoggingConfig {
    pub severity: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            severity: "info".to_string(),
            json: true,
            otlp_endpoint: None,
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub fixed_token: FixedTokenConfig,
    pub cors: CorsConfig,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FixedTokenConfig {
    /// Shared secret for server-to-server calls, also presented to downstreams.
    pub api: Secret<String>,
    /// Shared secret embedded in the webhook url registered at the PSP.
    pub webhook: Secret<String>,
}

impl Default for FixedTokenConfig {
    fn default() -> Self {
        Self {
            api: Secret::new(String::new()),
            webhook: Secret::new(String::new()),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub disable: bool,
    pub allow_origin: String,
}

/// What the hosted payment page shows.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct InvoiceConfig {
    pub title: String,
    pub description: String,
    pub purpose: String,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            title: "Convention Registration".to_string(),
            description: "Please pay for your convention registration".to_string(),
            purpose: "Convention registration fee".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Inmemory,
    Mongodb,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(rename = "use")]
    pub kind: DatabaseKind,
    pub url: Secret<String>,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::Inmemory,
            url: Secret::new(String::new()),
            name: "paylink".to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct NotifyConfig {
    /// Recipient of operator alerts. Empty disables mail, alerts are only logged.
    pub error_notify_mail: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub open_cooldown_seconds: u64,
    pub half_open_probe_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            open_cooldown_seconds: 120,
            half_open_probe_seconds: 30,
            request_timeout_seconds: 15,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            open_cooldown: Duration::from_secs(self.open_cooldown_seconds),
            half_open_probe_timeout: Duration::from_secs(self.half_open_probe_seconds),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct PaymentConfig {
    /// Webhooks for reference ids without this prefix belong to another
    /// environment sharing the PSP instance. Empty accepts everything.
    pub required_ref_id_prefix: String,
}

impl Config {
    /// Load from the file named by `PAYLINK_CONFIG` (default `configuration`)
    /// and `PAYLINK__SECTION__KEY` environment variables, then validate.
    pub fn load() -> Result<Self, AppError> {
        let file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| "configuration".to_string());
        let config: Config = load(&ConfigSource::new(file, ENV_PREFIX))?;
        config.validate()?;
        // port 0 picks a random port, only useful when the caller can ask for it
        if config.server.port == 0 {
            return Err(AppError::ConfigError(anyhow!(
                "invalid configuration - server.port: must not be 0"
            )));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let mut errs = ErrorDetails::new();

        for (key, url) in [
            ("service.public_url", &self.service.public_url),
            ("service.payment_service", &self.service.payment_service),
            ("service.attendee_service", &self.service.attendee_service),
            ("service.mail_service", &self.service.mail_service),
            ("service.psp_downstream", &self.service.psp_downstream),
        ] {
            check_base_url(&mut errs, key, url);
        }

        if !self.service.psp_downstream.is_empty() {
            if self.service.psp_instance.is_empty() {
                add(&mut errs, "service.psp_instance", "required when a PSP url is set");
            }
            if self.service.psp_api_secret.expose_secret().is_empty() {
                add(&mut errs, "service.psp_api_secret", "required when a PSP url is set");
            }
        }

        check_token(&mut errs, "security.fixed_token.api", &self.security.fixed_token.api);
        check_token(
            &mut errs,
            "security.fixed_token.webhook",
            &self.security.fixed_token.webhook,
        );

        if self.database.kind == DatabaseKind::Mongodb
            && self.database.url.expose_secret().is_empty()
        {
            add(&mut errs, "database.url", "required when database.use is mongodb");
        }

        if self.circuit_breaker.failure_threshold == 0 {
            add(&mut errs, "circuit_breaker.failure_threshold", "must be at least 1");
        }

        if errs.is_empty() {
            return Ok(());
        }

        let summary = errs
            .iter()
            .map(|(key, messages)| format!("{}: {}", key, messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        Err(AppError::ConfigError(anyhow!(
            "invalid configuration - {}",
            summary
        )))
    }
}

fn add(errs: &mut ErrorDetails, key: &str, message: &str) {
    errs.entry(key.to_string())
        .or_default()
        .push(message.to_string());
}

fn check_base_url(errs: &mut ErrorDetails, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        add(errs, key, "must be empty or start with http:// or https://");
    }
    if value.ends_with('/') {
        add(errs, key, "must not end with a trailing slash");
    }
}

fn check_token(errs: &mut ErrorDetails, key: &str, value: &Secret<String>) {
    if value.expose_secret().len() < MIN_TOKEN_LENGTH {
        add(
            errs,
            key,
            &format!("must be at least {} characters long", MIN_TOKEN_LENGTH),
        );
    }
}
