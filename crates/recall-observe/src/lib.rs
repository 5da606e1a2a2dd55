//! Observability setup for Recall: tracing subscriber installation with
//! optional OpenTelemetry span export.

pub mod tracing_setup;
