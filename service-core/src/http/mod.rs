//! Outbound HTTP plumbing shared by all downstream clients.
pub mod circuit_breaker;
pub mod downstream;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState};
pub use downstream::{DownstreamClient, DownstreamConfig, DownstreamError};
