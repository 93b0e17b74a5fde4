//! W3C trace context propagation for calls to downstream services.
//!
//! See: https://www.w3.org/TR/trace-context/

use opentelemetry::trace::TraceContextExt;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::middleware::tracing::REQUEST_ID_HEADER;

pub const TRACEPARENT_HEADER: &str = "traceparent";

pub const TRACESTATE_HEADER: &str = "tracestate";

/// Inject the current span's trace context as traceparent/tracestate headers.
///
/// Does nothing when no OpenTelemetry layer is installed.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let span = Span::current();
    let context = span.context();
    let otel_span = context.span();
    let span_context = otel_span.span_context();

    if !span_context.is_valid() {
        return;
    }

    // version-trace_id-span_id-trace_flags
    let traceparent = format!(
        "00-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags().to_u8()
    );
    if let Ok(value) = HeaderValue::from_str(&traceparent) {
        headers.insert(TRACEPARENT_HEADER, value);
    }

    let tracestate = span_context.trace_state().header();
    if !tracestate.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&tracestate) {
            headers.insert(TRACESTATE_HEADER, value);
        }
    }
}

/// Inject trace context and, if present, the request id.
pub fn inject_trace_headers(headers: &mut HeaderMap, request_id: Option<&str>) {
    inject_trace_context(headers);

    if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}
