#![allow(dead_code)]

use paylink_service::config::Config;
use paylink_service::services::Simulators;
use paylink_service::Application;
use secrecy::Secret;
use serde_json::Value;

pub const API_TOKEN: &str = "api-token-for-tests-0001";
pub const WEBHOOK_SECRET: &str = "webhook-secret-for-tests-01";
pub const NOTIFY_MAIL: &str = "ops@example.com";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub sims: Simulators,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn with every downstream simulated, after `customize` had a go at
    /// the configuration.
    pub async fn spawn_with(customize: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::default();
        config.server.address = "127.0.0.1".to_string();
        config.server.port = 0;
        config.logging.json = false;
        config.security.fixed_token.api = Secret::new(API_TOKEN.to_string());
        config.security.fixed_token.webhook = Secret::new(WEBHOOK_SECRET.to_string());
        config.notify.error_notify_mail = NOTIFY_MAIL.to_string();
        customize(&mut config);
        config.validate().expect("Invalid test configuration");

        let sims = Simulators::new(config.service.public_url.clone());
        let app = Application::build_with(config, sims.dependencies())
            .await
            .expect("Failed to build test application");

        let port = app.http_port();
        let address = format!("http://127.0.0.1:{}", port);

        let (shutdown, stopped) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            app.run_with_shutdown(async move {
                let _ = stopped.await;
            })
            .await
            .ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/info/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
            sims,
            _shutdown: shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn create_paylink(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/rest/v1/paylinks"))
            .header("X-Api-Key", API_TOKEN)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_webhook(&self, body: &Value) -> reqwest::Response {
        self.post_webhook_raw(body.to_string()).await
    }

    pub async fn post_webhook_raw(&self, body: String) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/api/rest/v1/webhook/{}", WEBHOOK_SECRET)))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Ledger writes plus lookups, i.e. every call the ledger has seen.
    pub async fn ledger_calls(&self) -> usize {
        self.sims.ledger.recording().await.len() + self.sims.ledger.lookups().await.len()
    }
}

pub fn webhook_event(paylink_id: i64, reference_id: &str) -> Value {
    serde_json::json!({
        "transaction": {
            "id": 4711,
            "uuid": "ignored-by-the-adapter",
            "invoice": {
                "number": "",
                "referenceId": reference_id,
                "paymentRequestId": paylink_id,
            }
        }
    })
}
