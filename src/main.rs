use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use lifepoint::assist::create_generator;
use lifepoint::config::AppConfig;
use lifepoint::identity::Hs256Verifier;
use lifepoint::profile::LibSqlProfileStore;
use lifepoint::server::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = init_tracing(&config);

    eprintln!("Lifepoint v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {}", config.db_path);
    eprintln!("   Session WS: ws://{}/ws/session", config.listen_addr());
    eprintln!("   Onboarding API: http://{}/api/onboarding", config.listen_addr());

    let store = LibSqlProfileStore::open(&config.db_path)
        .await
        .context("opening profile store")?;

    let state = AppState {
        store: Arc::new(store),
        verifier: Arc::new(Hs256Verifier::from_config(&config.auth)),
        generator: create_generator(&config.assist),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;
    tracing::info!(addr = %config.listen_addr(), "Lifepoint server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("serving")?;

    tracing::info!("Lifepoint server stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lifepoint.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stdout).init();
            None
        }
    }
}
