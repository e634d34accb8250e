//! The catnip-supervisor daemon.
//!
//! Watches the workspace for agent activity, checkpoints in-progress work,
//! and graduates scratch branches until interrupted.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use catnip_core::config::SupervisorConfig;
use catnip_core::llm::ClaudeCliClient;
use catnip_supervisor::Supervisor;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SupervisorConfig::from_env();
    let supervisor = Supervisor::new(config, Arc::new(ClaudeCliClient::new()));

    supervisor.start().await;
    info!("supervisor running; press Ctrl-C to stop");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for shutdown signal");
    }

    supervisor.stop().await;
}
