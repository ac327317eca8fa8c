use std::panic;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, SandboxKind};
use crate::core::domain::{ExecutionResult, ExecutionStatus};
use crate::core::pipeline::workers::{JudgeQueue, handle_judging};
use crate::core::store::SubmissionStore;
use crate::core::traits::sandbox::Sandbox;
use crate::http::AppState;
use crate::native::executor::NativeSandbox;
use crate::native::limited::LimitedSandbox;
use crate::stubs::sandbox::SandboxStub;

mod config;
mod constants;
mod core;
mod http;
mod native;
mod stubs;


#[tokio::main]
#[tracing::instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("judgecore=info")),
        )
        .init();
    set_panic_hook();

    let config = AppConfig::load()?;
    let sandbox = build_sandbox(&config);
    tracing::info!("Using {:?} sandbox", config.sandbox.kind);

    let store = SubmissionStore::new();
    let (queue, job_rx) = JudgeQueue::new(config.workers.queue_capacity);
    let shutdown = CancellationToken::new();

    let judging = handle_judging(
        queue.clone(),
        job_rx,
        store.clone(),
        sandbox.clone(),
        config.worker_settings(),
        shutdown.clone(),
    );

    let app = http::router(AppState {
        sandbox,
        store,
        queue,
        defaults: config.limits.defaults(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    tracing::info!("HTTP server listening on {}", config.server.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    judging.await?;

    Ok(())
}

fn build_sandbox(config: &AppConfig) -> Arc<dyn Sandbox> {
    let process = config.sandbox.process_config();
    match config.sandbox.kind {
        SandboxKind::Native => Arc::new(NativeSandbox::new(process)),
        SandboxKind::Limited => Arc::new(LimitedSandbox::new(
            process,
            config.sandbox.memory_poll_interval(),
        )),
        SandboxKind::Stub => {
            tracing::warn!("Stub sandbox selected: no code will run, verdicts are meaningless");
            Arc::new(SandboxStub::new(
                Ok(ExecutionResult {
                    output: String::new(),
                    execution_time_ms: 0,
                    memory_used_kb: 0,
                    status: ExecutionStatus::Success,
                }),
                Duration::from_millis(100),
            ))
        }
    }
}

/// Resolves on Ctrl+C and cancels running judge jobs, which returns them to
/// PENDING.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return std::future::pending().await;
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
