use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formtrace::api::{routes::create_router, state::AppState};
use formtrace::browser::BrowserManager;
use formtrace::config::Config;
use formtrace::coordinator::Orchestrator;
use formtrace::event_log::{EventLog, LogStore, SqliteLogStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let store: Arc<dyn LogStore> = Arc::new(
        SqliteLogStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?,
    );
    tracing::info!("Using database at {}", config.db_path.display());
    let log = EventLog::spawn(Arc::clone(&store));

    let (host_tx, host_rx) = mpsc::unbounded_channel();
    let browser = Arc::new(BrowserManager::new(config.headless, host_tx));
    let orchestrator = Orchestrator::start(
        browser.clone(),
        host_rx,
        log,
        store,
        config.orchestrator(),
    );

    let app = create_router(Arc::new(AppState::new(orchestrator)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid HOST/PORT")?;
    tracing::info!("formtrace starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    if let Err(e) = browser.close_all().await {
        tracing::warn!("Failed to close browser: {}", e);
    }
    Ok(())
}
