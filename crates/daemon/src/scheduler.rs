//! Polling scheduler for the mirror daemon.
//!
//! The catalog database is checked every poll interval; a pass runs on the
//! first check and then whenever the database's modification time changes.
//! Passes run on the blocking thread pool and are awaited before the next
//! check, so two passes never overlap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use reftree_core::catalog::profile::is_app_running;
use reftree_core::catalog::{CatalogProvider, SourceWatcher};
use reftree_core::engine::{is_destination_error, MirrorEngine, PassStats};

use crate::signals::{is_shutdown_requested, ShutdownFlag};

/// How the polling loop behaves.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Skip passes while the catalog application is not running.
    pub require_app_running: bool,
    /// Which application to look for: Zotero itself or Firefox.
    pub standalone: bool,
}

/// Counters kept across the lifetime of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub passes: u64,
    pub failed_passes: u64,
    pub skipped_not_running: u64,
}

/// Run the mirror engine in a polling loop until shutdown is requested.
///
/// Returns an error only for conditions no later poll can fix: the catalog
/// database disappearing, or the destination becoming unusable.
pub async fn run_polling_loop<P>(
    engine: Arc<MirrorEngine<P>>,
    mut watcher: SourceWatcher,
    options: PollOptions,
    shutdown: ShutdownFlag,
) -> Result<LoopStats>
where
    P: CatalogProvider + Send + Sync + 'static,
{
    info!(
        interval_secs = options.interval.as_secs(),
        db = %watcher.path().display(),
        "starting polling loop"
    );

    let mut stats = LoopStats::default();
    let mut first = true;

    loop {
        if is_shutdown_requested(&shutdown) {
            info!("shutdown requested, exiting polling loop");
            break;
        }

        let changed = watcher
            .poll()
            .context("catalog database is no longer reachable")?;

        if changed {
            if first {
                info!("running startup pass");
            } else {
                info!(
                    at = %chrono::Local::now().format("%Y-%m-%d %H:%M"),
                    "database modification detected"
                );
            }
            first = false;

            if options.require_app_running && !is_app_running(options.standalone) {
                // Retried on the next modification.
                error!("Zotero is not running; skipping pass");
                stats.skipped_not_running += 1;
            } else {
                run_one(&engine, &mut watcher, &mut stats).await?;
            }
        }

        if !sleep_unless_shutdown(options.interval, &shutdown).await {
            info!("shutdown requested during sleep, exiting");
            break;
        }
    }

    Ok(stats)
}

async fn run_one<P>(
    engine: &Arc<MirrorEngine<P>>,
    watcher: &mut SourceWatcher,
    stats: &mut LoopStats,
) -> Result<()>
where
    P: CatalogProvider + Send + Sync + 'static,
{
    let worker = engine.clone();
    let result = tokio::task::spawn_blocking(move || worker.run_pass())
        .await
        .context("mirror pass panicked")?;
    stats.passes += 1;

    match result {
        Ok(pass) => {
            log_pass(&pass);
            Ok(())
        }
        Err(e) if is_destination_error(&e) => {
            Err(anyhow::Error::new(e).context("destination tree is unusable"))
        }
        Err(e) => {
            stats.failed_passes += 1;
            error!(error = %e, "mirror pass failed; retrying after the next interval");
            // Force a pass on the next poll even if the database is unchanged.
            watcher.reset();
            Ok(())
        }
    }
}

fn log_pass(pass: &PassStats) {
    let elapsed_ms = match (pass.started_at, pass.completed_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds(),
        _ => 0,
    };
    if !pass.failures.is_empty() {
        warn!(
            failures = pass.failures.len(),
            "some filesystem operations failed; they will be retried on the next pass"
        );
        for failure in &pass.failures {
            warn!(op = %failure.op, path = %failure.path.display(), error = %failure.error, "operation failed");
        }
    }
    if pass.is_noop() {
        info!(elapsed_ms, "destination already up to date");
    } else {
        info!(
            deleted = pass.deleted,
            created = pass.created,
            dry_run = pass.dry_run,
            elapsed_ms,
            "pass completed with changes"
        );
    }
}

/// Sleep for `interval` in one-second steps. Returns `false` if shutdown was
/// requested meanwhile.
async fn sleep_unless_shutdown(interval: Duration, shutdown: &ShutdownFlag) -> bool {
    let sleep_step = Duration::from_secs(1).min(interval);
    let mut slept = Duration::ZERO;
    while slept < interval {
        if is_shutdown_requested(shutdown) {
            return false;
        }
        tokio::time::sleep(sleep_step).await;
        slept += sleep_step;
    }
    !is_shutdown_requested(shutdown)
}
