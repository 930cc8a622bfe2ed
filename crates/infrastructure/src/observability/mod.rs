//! Observability module
//!
//! - Metrics collection with the `metrics` facade
//! - Structured domain event logging

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
