use std::sync::Arc;

use tokio::sync::mpsc;

use copyflow::api::create_router;
use copyflow::config::EngineConfig;
use copyflow::engine::Engine;
use copyflow::execution::{
    AdapterRegistry, ExecutionDispatcher, PaperAdapter, RiskBook, TerminalSession,
};
use copyflow::services::{run_aggregator, run_risk_monitor, PerformanceBook};
use copyflow::store::{postgres, MemoryStore, PgStore, Store};
use copyflow::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let metrics_handle = copyflow::metrics::init_metrics();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = postgres::init_pool(url).await?;
            let store = PgStore::new(pool);
            store.migrate().await?;
            tracing::info!("Database connected");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set — running against the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Execution layer ---
    let mut adapters = AdapterRegistry::new();
    for platform in &config.paper_platforms {
        adapters.register(Arc::new(PaperAdapter::new(platform.clone())));
    }
    tracing::info!(
        platforms = ?adapters.platforms(),
        "Venue adapters registered"
    );
    let adapters = Arc::new(adapters);

    let risk = Arc::new(RiskBook::new());
    let (terminal_tx, terminal_rx) = mpsc::channel::<TerminalSession>(1_024);

    let dispatcher = Arc::new(ExecutionDispatcher::new(
        store.clone(),
        adapters,
        risk.clone(),
        config.dispatcher_config(),
        terminal_tx,
    ));
    let engine = Arc::new(Engine::new(store.clone(), dispatcher));

    // --- Background services ---
    let performance = Arc::new(PerformanceBook::new());
    tokio::spawn(run_aggregator(
        store.clone(),
        risk.clone(),
        performance.clone(),
        terminal_rx,
    ));
    tokio::spawn(run_risk_monitor(
        store.clone(),
        risk.clone(),
        config.risk_monitor_interval_secs,
    ));

    // Fail-safe restart: resolve sessions left open past their deadline.
    let recovered = engine.recover().await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "Stale sessions resolved at startup");
    }

    let state = AppState {
        store,
        engine,
        performance,
        config,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
