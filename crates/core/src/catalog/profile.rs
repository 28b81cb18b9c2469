//! Locating the Zotero database and checking whether Zotero is running.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::zotero::DATABASE_FILE;
use crate::errors::ConfigError;

/// Which Zotero installation to look for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileFlavor {
    /// Either, as long as only one is present.
    #[default]
    Any,
    /// Zotero Standalone (and Zotero 5+ data directories).
    Standalone,
    /// The legacy Firefox extension.
    Browser,
}

/// A database found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedDatabase {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub standalone: bool,
}

impl LocatedDatabase {
    /// Describe a database the user pointed at explicitly.
    pub fn from_db_path(db_path: PathBuf) -> Self {
        let data_dir = db_path.parent().map(Path::to_path_buf).unwrap_or_default();
        let standalone = !data_dir.to_string_lossy().to_lowercase().contains("firefox");
        Self {
            db_path,
            data_dir,
            standalone,
        }
    }
}

/// Candidate data directories for each installation kind.
#[derive(Debug, Clone, Default)]
pub struct SearchPaths {
    pub standalone: Vec<PathBuf>,
    pub browser: Vec<PathBuf>,
}

impl SearchPaths {
    /// The well-known profile locations under the user's home directory.
    pub fn platform_defaults() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| ConfigError::InvalidValue {
            field: "catalog.db_path".into(),
            detail: "cannot determine home directory; set the database path explicitly".into(),
        })?;

        if cfg!(windows) {
            return Err(ConfigError::UnsupportedPlatform(
                "Windows is not supported (attachment links need symlinks)".into(),
            ));
        }

        let mut paths = Self::default();
        if cfg!(target_os = "macos") {
            let support = home.join("Library/Application Support");
            paths.browser = list_profiles(&support.join("Firefox/Profiles"));
            paths.standalone = list_profiles(&support.join("Zotero/Profiles"));
        } else {
            paths.browser = list_profiles(&home.join(".mozilla/firefox/Profiles"));
            paths.standalone = list_profiles(&home.join(".zotero/Profiles"));
        }
        paths.standalone.push(home.join("Zotero"));
        Ok(paths)
    }
}

/// Find the single Zotero database in the platform's profile locations.
pub fn locate_database(flavor: ProfileFlavor) -> Result<LocatedDatabase, ConfigError> {
    let located = locate_in(&SearchPaths::platform_defaults()?, flavor)?;
    info!(db = %located.db_path.display(), standalone = located.standalone, "Zotero database found");
    Ok(located)
}

/// Find the single Zotero database among `paths`.
///
/// A candidate directory qualifies if it holds `zotero.sqlite` directly or
/// in a `zotero/` subdirectory. Zero matches and more than one match are
/// both errors.
pub fn locate_in(paths: &SearchPaths, flavor: ProfileFlavor) -> Result<LocatedDatabase, ConfigError> {
    let mut candidates: Vec<(&Path, bool)> = Vec::new();
    if flavor != ProfileFlavor::Browser {
        candidates.extend(paths.standalone.iter().map(|p| (p.as_path(), true)));
    }
    if flavor != ProfileFlavor::Standalone {
        candidates.extend(paths.browser.iter().map(|p| (p.as_path(), false)));
    }

    let mut found: Vec<LocatedDatabase> = Vec::new();
    for (dir, standalone) in &candidates {
        if let Some(data_dir) = database_dir(dir) {
            debug!(dir = %data_dir.display(), standalone, "candidate Zotero profile");
            found.push(LocatedDatabase {
                db_path: data_dir.join(DATABASE_FILE),
                data_dir,
                standalone: *standalone,
            });
        }
    }

    match found.len() {
        0 => Err(ConfigError::DatabaseNotFound {
            searched: candidates
                .iter()
                .map(|(p, _)| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
        1 => Ok(found.remove(0)),
        _ => {
            let listed = found
                .iter()
                .map(|f| f.db_path.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let kinds_differ = found.iter().any(|f| f.standalone) && found.iter().any(|f| !f.standalone);
            let detail = if kinds_differ {
                format!("both standalone and browser Zotero databases exist ({listed}); choose one")
            } else {
                format!("several profiles hold a database ({listed}); pass the database path")
            };
            Err(ConfigError::AmbiguousProfile(detail))
        }
    }
}

fn database_dir(dir: &Path) -> Option<PathBuf> {
    if dir.join(DATABASE_FILE).is_file() {
        return Some(dir.to_path_buf());
    }
    let nested = dir.join("zotero");
    nested.join(DATABASE_FILE).is_file().then_some(nested)
}

/// Non-hidden entries of a profiles directory; empty if it does not exist.
fn list_profiles(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut profiles: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path())
        .collect();
    profiles.sort();
    profiles
}

/// Whether the Zotero application (or Firefox, for the browser extension)
/// appears in the process table.
///
/// On platforms without `/proc` the answer is always `true`.
pub fn is_app_running(standalone: bool) -> bool {
    let wanted = if standalone { "zotero" } else { "firefox" };
    match running_process_names() {
        Some(names) => names.iter().any(|n| n == wanted),
        None => {
            debug!("process table not readable on this platform; assuming {wanted} is running");
            true
        }
    }
}

#[cfg(target_os = "linux")]
fn running_process_names() -> Option<Vec<String>> {
    let entries = fs::read_dir("/proc").ok()?;
    let names = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|e| fs::read_to_string(e.path().join("comm")).ok())
        .map(|comm| {
            let name = comm.trim();
            name.strip_suffix(".exe").unwrap_or(name).to_string()
        })
        .collect();
    Some(names)
}

#[cfg(not(target_os = "linux"))]
fn running_process_names() -> Option<Vec<String>> {
    None
}
