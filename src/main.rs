use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use packit_dispatch::config::ServiceConfig;
use packit_dispatch::github::{GitHubConfigResolver, GitHubForge};
use packit_dispatch::handlers::{DryRunExecutor, HandlerContext, InMemoryBuildStore};
use packit_dispatch::metrics::METRICS;
use packit_dispatch::process::EventProcessor;
use packit_dispatch::registry::{self, RegistryError};
use packit_dispatch::server::{AppState, build_router};
use packit_dispatch::telemetry::init_tracing;
use packit_dispatch::worker::{TaskQueue, WorkerPool};

#[derive(Debug, Error)]
enum StartupError {
    #[error("handler registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("GitHub client: {0}")]
    GitHub(#[from] octocrab::Error),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false, "info");
            error!(error = %e, "failed to start");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_json, &config.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServiceConfig) -> Result<(), StartupError> {
    let registry = registry::init(config.handler_retry_policy())?;

    let forge = match &config.github_token {
        Some(token) => GitHubForge::from_token(token.clone())?,
        None => {
            warn!("GITHUB_TOKEN is not set, using anonymous GitHub access");
            GitHubForge::anonymous()?
        }
    }
    .with_timeout(config.forge_timeout);
    let resolver = Arc::new(GitHubConfigResolver::new(forge.clone()));
    let forge = Arc::new(forge);

    let (queue, receiver) = TaskQueue::bounded(config.queue_capacity);
    let ctx = HandlerContext::new(
        Arc::new(InMemoryBuildStore::new()),
        Arc::new(DryRunExecutor::new()),
        Arc::clone(&forge),
        Arc::clone(&registry),
    )
    .with_cancel_running_builds(config.cancel_running_builds);
    let pool = WorkerPool::spawn(config.worker_count, queue.clone(), receiver.clone(), ctx, None);

    let listen_addr = config.listen_addr;
    let processor = EventProcessor::new(config, registry, resolver, forge, queue, &METRICS);
    let app = build_router(AppState::new(processor, &METRICS));

    let listener = TcpListener::bind(listen_addr).await?;
    info!(%listen_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    receiver.close().await;
    pool.shutdown().await;
    METRICS.flush();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "cannot listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
