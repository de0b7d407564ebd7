//! Attribution and read-only metrics projection.

pub mod attribution;
pub mod metrics;

pub use attribution::{AttributionEngine, AttributionRecord, Touchpoint};
pub use metrics::OmnichannelMetrics;
