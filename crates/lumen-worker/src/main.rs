use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use lumen_core::{Config, WebhookDispatcher};
use lumen_db::{PgBroker, PgQueries, Queries};
use lumen_infra::HttpWebhookDispatcher;
use lumen_processing::tool_available;
use lumen_worker::{default_handlers, JobDeps, WorkerPool, WorkerPoolConfig};

/// Upper bound on how long a running job may go unacked before it is requeued
const MAX_STALE_AFTER_SECS: u64 = 7 * 24 * 3600;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;
    lumen_infra::init_telemetry(config.log_format)?;

    tracing::info!(
        environment = %config.environment,
        storage_backend = %config.storage.backend,
        concurrency = config.worker.concurrency,
        "Starting lumen worker"
    );

    for tool in [
        &config.tools.ffmpeg,
        &config.tools.ffprobe,
        &config.tools.cwebp,
        &config.tools.pdfinfo,
        &config.tools.pdftoppm,
    ] {
        if !tool_available(tool) {
            tracing::warn!(tool = %tool, "External tool not found, jobs that need it will fail");
        }
    }

    let pool = lumen_db::connect(&config).await?;
    lumen_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let broker = Arc::new(PgBroker::new(pool.clone(), config.worker.max_attempts));
    // Jobs a crashed worker left running
    let stale_after = chrono::Duration::seconds(
        config
            .worker
            .job_timeout_seconds
            .saturating_mul(2)
            .min(MAX_STALE_AFTER_SECS) as i64,
    );
    broker
        .requeue_stale(stale_after)
        .await
        .context("Failed to requeue stale jobs")?;

    let queries: Arc<dyn Queries> = Arc::new(PgQueries::new(pool.clone()));
    let storage = lumen_storage::create_storage(&config.storage)
        .await
        .context("Failed to initialize storage")?;
    let webhooks: Arc<dyn WebhookDispatcher> = Arc::new(HttpWebhookDispatcher::new(
        queries.clone(),
        config.webhook_timeout_seconds,
    )?);

    let deps = JobDeps {
        storage,
        queries,
        registry: lumen_processing::build_registry(&config),
        webhooks,
    };
    let video = Arc::new(lumen_processing::video_processor(&config));
    let handlers = default_handlers(&deps, video);

    let worker_pool = WorkerPool::new(broker, handlers, WorkerPoolConfig::from(&config.worker));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    worker_pool.run(shutdown).await;
    pool.close().await;
    tracing::info!("Lumen worker stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM. A signal that cannot be installed never
/// resolves, leaving the other one in charge.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully, waiting for in-flight jobs");
}
