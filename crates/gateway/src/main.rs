use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sk_client::{resolve_auth, AuthScope, RestSuperKanbanClient};
use sk_gateway::cli::{self, Cli, Command};
use sk_gateway::presence::ReadinessPhase;
use sk_gateway::state::AppState;
use sk_gateway::ws::gateway_ws;
use sk_spool::SpoolEngine;
use sk_telegram::{apply_network_tuning, NetworkTuning};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sk_gateway=debug")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Reconcile(args) => {
            let code = cli::reconcile::run(args).await?;
            std::process::exit(code);
        }
        Command::Doctor => {
            let (config, path) = cli::load_config()?;
            let ok = cli::doctor::run(&config, &path).await?;
            std::process::exit(if ok { 0 } else { 1 });
        }
        Command::Version => {
            println!("super-kanban {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    tracing::info!("sk-sync starting");

    // ── Config ───────────────────────────────────────────────────────
    let (config, config_path) = cli::load_config()?;
    let errors: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|e| e.severity == sk_domain::config::ConfigSeverity::Error)
        .collect();
    if !errors.is_empty() {
        for e in &errors {
            tracing::error!(issue = %e, "configuration error");
        }
        anyhow::bail!("invalid configuration in {config_path}");
    }

    // Credentials must resolve for both scopes before anything starts.
    resolve_auth(&config.super_kanban, AuthScope::Read)
        .context("resolving read credentials")?;
    resolve_auth(&config.super_kanban, AuthScope::Write)
        .context("resolving write credentials")?;

    let config = Arc::new(config);
    let state = AppState::new(config.clone());
    let shutdown = CancellationToken::new();

    // ── Network tuning (apply-once) ──────────────────────────────────
    apply_network_tuning(NetworkTuning::default());

    // ── Exporter ─────────────────────────────────────────────────────
    let client = RestSuperKanbanClient::new(&config.super_kanban, shutdown.clone())
        .map_err(|e| anyhow::anyhow!("super-kanban client: {e}"))?;
    let engine = Arc::new(SpoolEngine::new(&config, Arc::new(client)));
    let engine_task = {
        let engine = engine.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { engine.run(token).await })
    };
    tracing::info!(
        state_dir = %config.state.dir.display(),
        plugin_id = %config.state.plugin_id,
        "transcript exporter running"
    );

    // ── Gateway WS ───────────────────────────────────────────────────
    state.readiness.transition(ReadinessPhase::Listening);

    let app = axum::Router::new()
        .route("/v1/gateway/ws", axum::routing::get(gateway_ws))
        .with_state(state.clone());

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "gateway listening");

    state.readiness.transition(ReadinessPhase::Ready);

    let server_shutdown = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                }
                _ = server_shutdown.cancelled() => {}
            }
        })
        .await;

    // Stop the exporter, flushing what is pending.
    shutdown.cancel();
    let _ = engine_task.await;

    if let Err(e) = result {
        state.readiness.transition(ReadinessPhase::Error);
        anyhow::bail!("gateway server: {e}");
    }
    tracing::info!("sk-sync stopped");
    Ok(())
}
