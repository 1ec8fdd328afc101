//! Observability setup for invoiceflow: structured `tracing` output with an
//! optional OpenTelemetry span exporter.

pub mod tracing_setup;
