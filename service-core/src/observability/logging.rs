use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log_level`. Spans are exported over OTLP only when an
/// endpoint is given; a failing exporter is reported and skipped so that the
/// service still starts with local logging.
pub fn init_tracing(service_name: &str, log_level: &str, otlp_endpoint: Option<&str>, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let telemetry = otlp_endpoint
        .filter(|endpoint| !endpoint.is_empty())
        .and_then(|endpoint| match otlp_tracer(service_name, endpoint) {
            Ok(tracer) => Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            Err(e) => {
                eprintln!(
                    "Failed to initialize OTLP tracer for service '{}' at endpoint '{}': {}",
                    service_name, endpoint, e
                );
                None
            }
        });

    let (json_layer, text_layer) = if json {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_file(true)
                    .with_line_number(true)
                    .json()
                    .flatten_event(true),
            ),
            None,
        )
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(telemetry)
        .with(json_layer)
        .with(text_layer)
        .init();
}

fn otlp_tracer(
    service_name: &str,
    endpoint: &str,
) -> Result<sdktrace::Tracer, opentelemetry::trace::TraceError> {
    let otlp_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(otlp_exporter)
        .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
            KeyValue::new("service.name", service_name.to_string()),
        ])))
        .install_batch(runtime::Tokio)
}
