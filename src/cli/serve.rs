use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::context::CliContext;
use super::runtime::build_orchestrator;
use crate::server::{build_router, ServerState};

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides server.port)
    #[arg(long)]
    pub port: Option<u16>,
}

pub async fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = ctx.config_path() {
        info!(path = %path.display(), "serving with config file");
    }

    let (orchestrator, _contexts) = build_orchestrator(&config)?;
    orchestrator.spawn_sweeper();
    info!(
        context_idle = %humantime::format_duration(config.session.context_idle()),
        session_idle = %humantime::format_duration(config.session.session_idle()),
        sweep_every = %humantime::format_duration(config.session.sweep_interval()),
        "session sweeper running"
    );

    let app = build_router(ServerState::new(orchestrator.clone()), &config.server);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    info!("tabpilot API listening on http://{bind_addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");
    orchestrator.shutdown();
    info!("server stopped");
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(?err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
