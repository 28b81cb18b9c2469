//! reftree daemon entry point.
//!
//! Resolves settings from the command line and an optional config file,
//! finds the Zotero database, claims the single-instance lock and then
//! either runs one mirror pass or polls the database until stopped.

mod instance;
mod scheduler;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reftree_core::catalog::profile::{
    is_app_running, locate_database, LocatedDatabase, ProfileFlavor,
};
use reftree_core::catalog::{SourceWatcher, ZoteroProvider};
use reftree_core::config::{expand_tilde, AppConfig};
use reftree_core::engine::MirrorEngine;
use reftree_core::reconcile::Reconciler;

use crate::instance::InstanceLock;
use crate::scheduler::PollOptions;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Keep a directory tree of collection folders and attachment links in sync
/// with a Zotero library.
#[derive(Parser, Debug)]
#[command(name = "reftree", version, about)]
struct Cli {
    /// Output location (root of the mirrored tree).
    dest: Option<PathBuf>,

    /// Location of zotero.sqlite (searched for if not given).
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Use zotero.sqlite from standalone Zotero.
    #[arg(long, conflicts_with = "browser")]
    standalone: bool,

    /// Use zotero.sqlite from the Firefox extension.
    #[arg(long)]
    browser: bool,

    /// Polling interval in seconds.
    #[arg(long, value_name = "SECS")]
    latency: Option<u64>,

    /// Verbosity level of logging (1 = info).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    verbose: Option<u8>,

    /// Don't modify the file system, only log what would change.
    #[arg(long)]
    test: bool,

    /// Run once and exit.
    #[arg(long)]
    nodaemon: bool,

    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mirror even when Zotero does not appear to be running.
    #[arg(long)]
    no_running_check: bool,
}

impl Cli {
    /// Load the config file (if any) and apply command-line overrides.
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load_from_file(expand_tilde(path))
                .context("failed to load configuration file")?,
            None => AppConfig::default(),
        };

        if let Some(dest) = &self.dest {
            config.mirror.dest = Some(dest.clone());
        }
        if let Some(latency) = self.latency {
            config.mirror.poll_interval_secs = latency;
        }
        if self.verbose == Some(1) || self.test {
            config.mirror.log_level = "info".into();
        }
        if self.test {
            config.mirror.dry_run = true;
        }
        if self.nodaemon {
            config.mirror.run_once = true;
        }
        if let Some(db) = &self.db {
            config.catalog.db_path = Some(db.clone());
        }
        if self.standalone {
            config.catalog.flavor = ProfileFlavor::Standalone;
        } else if self.browser {
            config.catalog.flavor = ProfileFlavor::Browser;
        }
        if self.no_running_check {
            config.catalog.require_app_running = false;
        }

        config.expand_paths();
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.mirror.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let database = match &config.catalog.db_path {
        Some(db) => {
            info!(db = %db.display(), "Zotero database specified");
            LocatedDatabase::from_db_path(db.clone())
        }
        None => {
            let found = locate_database(config.catalog.flavor)
                .context("failed to find the Zotero database")?;
            info!(db = %found.db_path.display(), "Zotero database found");
            found
        }
    };

    // Checked by validate().
    let dest = config
        .mirror
        .dest
        .clone()
        .context("no destination directory given")?;

    info!("========================================");
    info!("  reftree v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Destination   : {}", dest.display());
    info!("Database      : {}", database.db_path.display());
    info!("Standalone    : {}", database.standalone);
    info!("Poll interval : {}s", config.mirror.poll_interval_secs);
    info!("Dry run       : {}", config.mirror.dry_run);
    info!("========================================");
    if config.mirror.dry_run {
        info!("running in test mode (no modifications will be made)");
    }

    let lock = InstanceLock::acquire(&config.mirror.state_dir)?;
    info!(pid_file = %lock.path().display(), "single-instance lock held");

    let provider = ZoteroProvider::new(&database.db_path, &database.data_dir);
    let reconciler = Reconciler::new(&dest).dry_run(config.mirror.dry_run);
    let engine = Arc::new(MirrorEngine::new(provider, reconciler));

    if config.mirror.run_once {
        return run_once(engine, &database, config.catalog.require_app_running).await;
    }

    let shutdown = signals::setup_signal_handlers();
    let options = PollOptions {
        interval: Duration::from_secs(config.mirror.poll_interval_secs),
        require_app_running: config.catalog.require_app_running,
        standalone: database.standalone,
    };
    let stats = scheduler::run_polling_loop(
        engine,
        SourceWatcher::new(&database.db_path),
        options,
        shutdown,
    )
    .await?;

    info!(
        passes = stats.passes,
        failed = stats.failed_passes,
        skipped = stats.skipped_not_running,
        "reftree stopped"
    );
    drop(lock);
    Ok(())
}

/// Single pass for `--nodaemon`; a failed pass is the process's failure.
async fn run_once(
    engine: Arc<MirrorEngine<ZoteroProvider>>,
    database: &LocatedDatabase,
    require_app_running: bool,
) -> Result<()> {
    if require_app_running && !is_app_running(database.standalone) {
        anyhow::bail!("Zotero is not running (use --no-running-check to mirror anyway)");
    }

    let stats = tokio::task::spawn_blocking(move || engine.run_pass())
        .await
        .context("mirror pass panicked")?
        .context("mirror pass failed")?;

    info!(
        deleted = stats.deleted,
        created = stats.created,
        omitted_links = stats.omitted_links,
        "pass complete"
    );
    if !stats.failures.is_empty() {
        anyhow::bail!(
            "{} filesystem operation(s) failed; first: {} {}: {}",
            stats.failures.len(),
            stats.failures[0].op,
            stats.failures[0].path.display(),
            stats.failures[0].error
        );
    }
    Ok(())
}
