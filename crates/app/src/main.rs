//! Lending service entry point.

use app::{AppError, Config, LendingService, telemetry};
use domain::LendingStore;
use lending_store::{InMemoryLendingStore, PostgresLendingStore};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S: LendingStore + Clone>(store: S, config: &Config) -> Result<(), AppError> {
    let service = LendingService::start(store, config);
    let policy = service.engine().policy();
    tracing::info!(
        max_borrows = policy.max_borrows,
        loan_period_days = policy.loan_period_days,
        "lending service ready"
    );

    let drifted = service.audit_inventory().await?;
    if drifted > 0 {
        tracing::warn!(drifted, "startup audit found inventory drift");
    }

    shutdown_signal().await;

    let events = service.shutdown().await?;
    tracing::info!(events, "notifier drained, shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    telemetry::init_tracing(&config)?;

    // 2. Install Prometheus exporter
    telemetry::install_metrics(config.metrics_addr)?;

    // 3. Pick a store and run
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresLendingStore::connect(
                url,
                config.database_max_connections,
                config.database_acquire_timeout,
            )
            .await?;
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");
            serve(store, &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(InMemoryLendingStore::new(), &config).await
        }
    }
}
