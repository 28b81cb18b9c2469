//! Single-instance guard backed by a PID file.
//!
//! Only one daemon may mirror from a given state directory at a time. A PID
//! file left behind by a dead process is treated as stale and replaced.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Get the PID file path inside `state_dir`.
pub fn pid_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join("reftree.pid")
}

/// Write the current process PID to the PID file.
pub fn write_pid_file(path: &Path) -> Result<()> {
    let pid = std::process::id();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create PID file directory")?;
    }
    fs::write(path, pid.to_string()).context("failed to write PID file")?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// Read the PID from the PID file, if it exists.
pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).context("failed to read PID file")?;
    let pid: u32 = contents
        .trim()
        .parse()
        .context("PID file contains invalid data")?;
    Ok(Some(pid))
}

/// Remove the PID file.
pub fn remove_pid_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).context("failed to remove PID file")?;
        info!(path = %path.display(), "removed PID file");
    }
    Ok(())
}

/// Check whether a process with the given PID is alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 only checks that the process exists.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// PID of another live daemon using `state_dir`, cleaning up a stale file.
pub fn running_instance(state_dir: &Path) -> Result<Option<u32>> {
    let pid_path = pid_file_path(state_dir);
    let pid = match read_pid_file(&pid_path) {
        Ok(pid) => pid,
        Err(e) => {
            warn!(error = %e, path = %pid_path.display(), "unreadable PID file; replacing it");
            remove_pid_file(&pid_path)?;
            return Ok(None);
        }
    };
    match pid {
        Some(pid) if pid != std::process::id() && is_process_alive(pid) => Ok(Some(pid)),
        Some(stale) => {
            info!(pid = stale, "removing stale PID file");
            remove_pid_file(&pid_path)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Holds the PID file for as long as it lives.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Claim `state_dir`, failing if another live daemon already owns it.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        if let Some(pid) = running_instance(state_dir)? {
            anyhow::bail!(
                "reftree is already running (PID {pid}); PID file at {}",
                pid_file_path(state_dir).display()
            );
        }
        let path = pid_file_path(state_dir);
        write_pid_file(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file(&self.path) {
            warn!(error = %e, "failed to remove PID file on exit");
        }
    }
}
