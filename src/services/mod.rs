pub mod aggregator;
pub mod risk_monitor;

pub use aggregator::{run_aggregator, ExternalRatios, PerformanceBook};
pub use risk_monitor::run_risk_monitor;
