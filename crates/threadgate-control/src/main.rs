//! Threadgate admin tool.
//!
//! This is the entry point for the `threadgate-admin` binary. It prepares the
//! session store and approves the session keys given on the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use threadgate_control::{ApprovalOutcome, SessionRegistry, ThreadgateConfig};
use threadgate_store::{schema, SqliteSessionStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Threadgate admin - prepare the session store and approve sessions.
#[derive(Parser, Debug)]
#[command(name = "threadgate-admin")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Session store path. Overrides the configured default.
    #[arg(long, env = "THREADGATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Session keys to approve for remote posting.
    session_keys: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,threadgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ThreadgateConfig::from_env()?;
    if let Some(path) = args.db_path {
        config.db_path = path;
    }
    tracing::info!(db_path = %config.db_path.display(), "Starting threadgate admin");

    let (store, report) = SqliteSessionStore::open_with_report(&config.db_path).map_err(|err| {
        tracing::error!(error = %err, fatal = err.is_fatal(), "Session store unusable");
        err
    })?;
    if !report.is_noop() {
        tracing::info!(added = ?report.added_columns, "Migrated session table");
    }

    let info = schema::inspect(store.path())?;
    tracing::info!(
        columns = info.columns.len(),
        indexes = ?info.indexes,
        journal_mode = %info.journal_mode,
        "Session store ready"
    );

    let registry = SessionRegistry::new(Arc::new(store), true);
    let mut failed = 0usize;
    for key in &args.session_keys {
        match registry.approve(key) {
            ApprovalOutcome::Applied { rows } => {
                tracing::info!(session_key = %key, rows, "Approval applied");
            }
            ApprovalOutcome::Failed { reason } => {
                tracing::error!(session_key = %key, reason = %reason, "Approval failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} approvals failed", args.session_keys.len());
    }
    Ok(())
}
