//! Application startup and lifecycle management.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{Config, CorsConfig};
use crate::handlers;
use crate::services::{init_metrics, Dependencies, PaylinkService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub paylinks: PaylinkService,
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    listener: TcpListener,
    router: Router,
    shutdown_grace: Duration,
}

impl Application {
    /// Build the application with downstreams chosen by the configuration.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let deps = Dependencies::from_config(&config).await?;
        Self::build_with(config, deps).await
    }

    /// Build the application around already constructed downstreams.
    pub async fn build_with(config: Config, deps: Dependencies) -> Result<Self, AppError> {
        init_metrics();

        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
            paylinks: PaylinkService::new(config.clone(), deps),
        };
        let router = router(state)?;

        // port 0 = random port for testing
        let addr = format!("{}:{}", config.server.address, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let http_port = listener.local_addr()?.port();

        tracing::info!(service = %config.service.name, "Listening on port {}", http_port);

        Ok(Self {
            http_port,
            listener,
            router,
            shutdown_grace: config.server.shutdown_grace(),
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` resolves. In-flight requests get the configured
    /// grace period, then the server is dropped.
    pub async fn run_with_shutdown(
        self,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let (stopping_tx, stopping_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                signal.await;
                let _ = stopping_tx.send(());
            })
            .into_future();

        let grace = self.shutdown_grace;
        let deadline = async move {
            match stopping_rx.await {
                Ok(()) => tokio::time::sleep(grace).await,
                Err(_) => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = server => {
                tracing::info!("Server stopped");
                result
            }
            _ = deadline => {
                tracing::warn!(grace_seconds = grace.as_secs(), "Shutdown grace period expired, closing remaining connections");
                Ok(())
            }
        }
    }
}

fn router(state: AppState) -> Result<Router, AppError> {
    let config = state.config.clone();

    let mut router = Router::new()
        .route(
            "/api/rest/v1/paylinks",
            post(handlers::paylinks::create_paylink),
        )
        .route(
            "/api/rest/v1/paylinks/:id",
            get(handlers::paylinks::get_paylink).delete(handlers::paylinks::delete_paylink),
        )
        .route(
            "/api/rest/v1/webhook/:secret",
            post(handlers::webhook::webhook),
        )
        .route("/info/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics));

    if state.paylinks.dependencies().psp_simulator.is_some() {
        tracing::info!("PSP simulator active, serving /simulator/{{id}}");
        router = router.route(
            "/simulator/:id",
            get(handlers::simulator::use_simulator),
        );
    }

    let mut router = router
        .route_layer(from_fn(metrics_middleware))
        .layer(TimeoutLayer::new(config.server.request_timeout()));

    if let Some(cors) = cors_layer(&config.security.cors)? {
        router = router.layer(cors);
    }

    Ok(router
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state))
}

fn cors_layer(cors: &CorsConfig) -> Result<Option<CorsLayer>, AppError> {
    if cors.disable {
        return Ok(None);
    }

    let origin = if cors.allow_origin.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let value = HeaderValue::from_str(&cors.allow_origin).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "security.cors.allow_origin is not a valid header value: {}",
                e
            ))
        })?;
        AllowOrigin::exact(value)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers(Any)
            .expose_headers([header::LOCATION]),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;
    use crate::services::Simulators;

    fn state(simulated_psp: bool) -> AppState {
        let config = Arc::new(Config::default());
        let mut deps = Simulators::new("").dependencies();
        if !simulated_psp {
            deps.psp_simulator = None;
        }
        AppState {
            config: config.clone(),
            paylinks: PaylinkService::new(config, deps),
        }
    }

    async fn status_of(router: Router, uri: &str) -> StatusCode {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn simulator_route_follows_the_psp_simulator() {
        let with = router(state(true)).unwrap();
        assert_eq!(status_of(with, "/simulator/42").await, StatusCode::OK);

        let without = router(state(false)).unwrap();
        assert_eq!(status_of(without, "/simulator/42").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let response = router(state(true))
            .unwrap()
            .oneshot(Request::builder().uri("/info/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[test]
    fn cors_can_be_disabled() {
        let disabled = CorsConfig {
            disable: true,
            allow_origin: String::new(),
        };
        assert!(cors_layer(&disabled).unwrap().is_none());
    }

    #[test]
    fn invalid_cors_origin_is_a_config_error() {
        let invalid = CorsConfig {
            disable: false,
            allow_origin: "http://bad\norigin".to_string(),
        };
        assert!(matches!(
            cors_layer(&invalid),
            Err(AppError::ConfigError(_))
        ));
    }
}
