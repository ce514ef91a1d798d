//! Observability for Signoff: tracing subscriber setup with optional
//! OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{DEFAULT_FILTER, LogFormat, init_tracing, shutdown_tracing};
