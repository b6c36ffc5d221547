#[cfg(feature = "prometheus")]
pub mod metrics;

#[cfg(feature = "prometheus")]
pub use metrics::{MetricsCollector, Outcome};
