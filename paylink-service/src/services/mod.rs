//! Downstream collaborators and the orchestration built on top of them.
//!
//! Every downstream has a trait with an HTTP implementation and an in-memory
//! simulator. An empty base url in the configuration selects the simulator.

pub mod audit;
pub mod directory;
pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod paylinks;
pub mod psp;
pub mod webhook;

use std::sync::Arc;

use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::http::{DownstreamClient, DownstreamConfig};

use crate::config::{Config, DatabaseKind};
use audit::{AuditLog, InMemoryAuditLog, MongoAuditLog};
use directory::{AttendeeDirectory, DirectoryClient, DirectorySimulator};
use ledger::{Ledger, LedgerClient, LedgerSimulator};
use notifier::{MailClient, MailSimulator, Notifier};
use psp::{PaymentProvider, PspClient, PspSimulator, RequestSigner};

pub use metrics::{get_metrics, init_metrics};
pub use paylinks::{PaylinkError, PaylinkService};
pub use webhook::{WebhookError, WebhookOutcome};

/// Fixed token header presented to the internal services.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Handles to every downstream, built once at startup.
#[derive(Clone)]
pub struct Dependencies {
    pub psp: Arc<dyn PaymentProvider>,
    pub ledger: Arc<dyn Ledger>,
    pub directory: Arc<dyn AttendeeDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
    /// Present when the PSP is simulated, enables the `/simulator/{id}` route.
    pub psp_simulator: Option<Arc<PspSimulator>>,
}

impl Dependencies {
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let service = &config.service;
        let api_token = config.security.fixed_token.api.clone();

        let (psp, psp_simulator) = if service.psp_downstream.is_empty() {
            tracing::warn!("service.psp_downstream not set, using the PSP simulator");
            let simulator = Arc::new(PspSimulator::new(service.public_url.clone()));
            (simulator.clone() as Arc<dyn PaymentProvider>, Some(simulator))
        } else {
            let signer = RequestSigner::new(service.psp_api_secret.clone());
            let client = PspClient::new(
                service.psp_downstream.clone(),
                service.psp_instance.clone(),
                signer,
                downstream(config, "psp")?,
            );
            (Arc::new(client) as Arc<dyn PaymentProvider>, None)
        };

        let ledger: Arc<dyn Ledger> = if service.payment_service.is_empty() {
            tracing::warn!("service.payment_service not set, using the ledger simulator");
            Arc::new(LedgerSimulator::new())
        } else {
            Arc::new(LedgerClient::new(
                service.payment_service.clone(),
                api_token.clone(),
                downstream(config, "ledger")?,
            ))
        };

        let directory: Arc<dyn AttendeeDirectory> = if service.attendee_service.is_empty() {
            tracing::warn!("service.attendee_service not set, using the attendee simulator");
            Arc::new(DirectorySimulator::new())
        } else {
            Arc::new(DirectoryClient::new(
                service.attendee_service.clone(),
                api_token.clone(),
                downstream(config, "attendee")?,
            ))
        };

        let notifier: Arc<dyn Notifier> = if service.mail_service.is_empty() {
            tracing::warn!("service.mail_service not set, using the mail simulator");
            Arc::new(MailSimulator::new())
        } else {
            Arc::new(MailClient::new(
                service.mail_service.clone(),
                api_token,
                downstream(config, "mail")?,
            ))
        };

        let audit: Arc<dyn AuditLog> = match config.database.kind {
            DatabaseKind::Mongodb => Arc::new(
                MongoAuditLog::connect(config.database.url.expose_secret(), &config.database.name)
                    .await?,
            ),
            DatabaseKind::Inmemory => {
                tracing::warn!("using the in-memory protocol store, entries are lost on restart");
                Arc::new(InMemoryAuditLog::new())
            }
        };

        Ok(Self {
            psp,
            ledger,
            directory,
            notifier,
            audit,
            psp_simulator,
        })
    }
}

fn downstream(config: &Config, name: &str) -> Result<DownstreamClient, AppError> {
    let mut downstream = DownstreamConfig::new(name);
    downstream.request_timeout = config.circuit_breaker.request_timeout();
    downstream.breaker = config.circuit_breaker.breaker();
    DownstreamClient::new(downstream).map_err(|e| AppError::ConfigError(e.into()))
}

/// Concrete simulators behind a [`Dependencies`], for inspection in tests
/// and local development.
#[derive(Clone)]
pub struct Simulators {
    pub psp: Arc<PspSimulator>,
    pub ledger: Arc<LedgerSimulator>,
    pub directory: Arc<DirectorySimulator>,
    pub mail: Arc<MailSimulator>,
    pub audit: Arc<InMemoryAuditLog>,
}

impl Simulators {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            psp: Arc::new(PspSimulator::new(public_url)),
            ledger: Arc::new(LedgerSimulator::new()),
            directory: Arc::new(DirectorySimulator::new()),
            mail: Arc::new(MailSimulator::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
        }
    }

    pub fn dependencies(&self) -> Dependencies {
        Dependencies {
            psp: self.psp.clone(),
            ledger: self.ledger.clone(),
            directory: self.directory.clone(),
            notifier: self.mail.clone(),
            audit: self.audit.clone(),
            psp_simulator: Some(self.psp.clone()),
        }
    }

    pub async fn reset(&self) {
        self.psp.reset().await;
        self.ledger.reset().await;
        self.directory.reset().await;
        self.mail.reset().await;
        self.audit.reset().await;
    }
}
