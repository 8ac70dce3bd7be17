pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::services::PerformanceBook;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: Arc<Engine>,
    pub performance: Arc<PerformanceBook>,
    pub config: EngineConfig,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}
