//! Observability setup for bioflow binaries.

pub mod tracing_setup;
