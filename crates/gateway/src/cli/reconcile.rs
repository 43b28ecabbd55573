//! `super-kanban reconcile` — CLI wiring for the offline replay engine.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sk_client::RestSuperKanbanClient;
use sk_reconcile::{ReconcileMode, ReconcileOptions, Reconciler};

use super::ReconcileArgs;

/// Run the reconciler.  Returns the process exit code: configuration and
/// auth problems are non-zero before any traversal starts.
pub async fn run(args: ReconcileArgs) -> anyhow::Result<i32> {
    let (mut config, _path) = super::load_config()?;

    if let Some(dir) = &args.state_dir {
        config.state.dir = dir.clone();
    }
    if let Some(url) = &args.base_url {
        config.super_kanban.base_url = url.clone();
    }
    if let Some(token) = &args.token {
        config.super_kanban.bearer_token = Some(token.clone());
    }
    if let Some(header) = &args.auth_header {
        config.super_kanban.auth_header = Some(header.clone());
    }

    let mode = if args.fix {
        ReconcileMode::Fix
    } else {
        ReconcileMode::DryRun
    };

    let api = match mode {
        ReconcileMode::Fix => {
            let client =
                RestSuperKanbanClient::new(&config.super_kanban, CancellationToken::new())
                    .map_err(|e| anyhow::anyhow!("super-kanban client: {e}"))?
                    .with_paths(
                        args.attach_path.clone(),
                        args.messages_path.clone(),
                        args.tool_calls_path.clone(),
                    );
            // Fail fast on missing write credentials, before any traversal.
            sk_client::resolve_auth(&config.super_kanban, sk_client::AuthScope::Write)
                .map_err(|e| anyhow::anyhow!("auth: {e}"))?;
            Some(Arc::new(client) as Arc<dyn sk_client::SuperKanbanApi>)
        }
        ReconcileMode::DryRun => None,
    };

    let options = ReconcileOptions {
        mode,
        agent_id: args.agent_id.clone(),
        session_id: args.session_id.clone(),
        session_key: args.session_key.clone(),
        max_sessions: args.max_sessions,
        preview: args.preview,
    };

    let reconciler = Reconciler::new(&config, options, api)
        .map_err(|e| anyhow::anyhow!("reconciler: {e}"))?;
    let report = reconciler.run().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(0)
}
