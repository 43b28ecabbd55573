pub mod doctor;
pub mod reconcile;

use clap::{Args, Parser, Subcommand};

/// super-kanban — OpenClaw ⇄ Super-Kanban session-lifecycle integration.
#[derive(Debug, Parser)]
#[command(name = "super-kanban", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway + transcript exporter (default).
    Serve,
    /// Replay archived transcripts into Super-Kanban.
    Reconcile(ReconcileArgs),
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Print version information.
    Version,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Post for real (mutually exclusive with --dry-run).
    #[arg(long, conflicts_with = "dry_run")]
    pub fix: bool,
    /// Count and preview without any HTTP writes (the default).
    #[arg(long)]
    pub dry_run: bool,

    /// Override the OpenClaw state directory.
    #[arg(long)]
    pub state_dir: Option<std::path::PathBuf>,
    /// Only this agent.
    #[arg(long = "agent")]
    pub agent_id: Option<String>,
    /// Only this session ID.
    #[arg(long)]
    pub session_id: Option<String>,
    /// Only this session key.
    #[arg(long)]
    pub session_key: Option<String>,
    /// Stop after matching this many sessions.
    #[arg(long)]
    pub max_sessions: Option<usize>,
    /// Keys previewed per session in the report.
    #[arg(long, default_value_t = 5)]
    pub preview: usize,
    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Override the Super-Kanban base URL.
    #[arg(long)]
    pub base_url: Option<String>,
    /// Bearer token override.
    #[arg(long)]
    pub token: Option<String>,
    /// Legacy `Name: value` auth header override.
    #[arg(long)]
    pub auth_header: Option<String>,

    /// Override the attach endpoint path.
    #[arg(long)]
    pub attach_path: Option<String>,
    /// Override the messages endpoint path.
    #[arg(long)]
    pub messages_path: Option<String>,
    /// Override the tool-calls endpoint path.
    #[arg(long)]
    pub tool_calls_path: Option<String>,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `SK_SYNC_CONFIG` (default `config.toml`)
/// and overlay the documented environment variables.  Shared by every
/// subcommand so the logic lives in one place.
pub fn load_config() -> anyhow::Result<(sk_domain::config::Config, String)> {
    let config_path = std::env::var("SK_SYNC_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config: sk_domain::config::Config =
        if std::path::Path::new(&config_path).exists() {
            let raw = std::fs::read_to_string(&config_path)
                .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
        } else {
            sk_domain::config::Config::default()
        };

    config.apply_env();
    Ok((config, config_path))
}
