//! Code that provides or improves the observability of the services:
//! initialization logic for logging and the global metrics registry plus the
//! HTTP endpoint that exposes them.

pub mod metrics;
pub mod tracing;
