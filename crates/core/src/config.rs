//! Configuration for the reftree mirror daemon.
//!
//! Settings are loaded from a TOML file and may be overridden from the
//! command line. Every field has a default, so an empty file is valid as
//! long as the destination is supplied elsewhere.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::profile::ProfileFlavor;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Destination tree and polling behaviour.
    #[serde(default)]
    pub mirror: MirrorSection,

    /// Where the catalog database lives.
    #[serde(default)]
    pub catalog: CatalogSection,
}

// ---------------------------------------------------------------------------
// Mirror section
// ---------------------------------------------------------------------------

/// Destination tree and polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSection {
    /// Root of the mirrored tree. Required, either here or on the command
    /// line.
    #[serde(default)]
    pub dest: Option<PathBuf>,

    /// Seconds between checks of the catalog database (default 10).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Compute and log the plan without touching the destination.
    #[serde(default)]
    pub dry_run: bool,

    /// Run a single pass and exit instead of polling.
    #[serde(default)]
    pub run_once: bool,

    /// Directory for the PID file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "warn".into()
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("reftree"))
        .unwrap_or_else(|| PathBuf::from("~/.local/share/reftree"))
}

impl Default for MirrorSection {
    fn default() -> Self {
        Self {
            dest: None,
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
            dry_run: false,
            run_once: false,
            state_dir: default_state_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog section
// ---------------------------------------------------------------------------

/// Catalog database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Explicit path to `zotero.sqlite`. When unset the database is
    /// searched for in the usual profile locations.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Which installation to search for when `db_path` is unset.
    #[serde(default)]
    pub flavor: ProfileFlavor,

    /// Skip passes while the catalog application is not running.
    #[serde(default = "default_true")]
    pub require_app_running: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            db_path: None,
            flavor: ProfileFlavor::default(),
            require_app_running: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Expand a leading `~` in every path setting, and anchor a relative
    /// database path at the current directory.
    pub fn expand_paths(&mut self) {
        if let Some(dest) = &self.mirror.dest {
            self.mirror.dest = Some(expand_tilde(dest));
        }
        self.mirror.state_dir = expand_tilde(&self.mirror.state_dir);
        if let Some(db) = &self.catalog.db_path {
            let db = expand_tilde(db);
            // Left relative on failure; validate() rejects it.
            self.catalog.db_path = Some(make_absolute(&db).unwrap_or(db));
        }
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Some(dest) = &self.mirror.dest else {
            return Err(ConfigError::InvalidValue {
                field: "mirror.dest".into(),
                detail: "destination directory must be set".into(),
            });
        };
        if dest.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "mirror.dest".into(),
                detail: "destination directory must not be empty".into(),
            });
        }
        if !dest.is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "mirror.dest".into(),
                detail: format!("'{}' is not an absolute path", dest.display()),
            });
        }
        if self.mirror.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mirror.poll_interval_secs".into(),
                detail: "poll interval must be > 0".into(),
            });
        }
        if !LOG_LEVELS.contains(&self.mirror.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "mirror.log_level".into(),
                detail: format!(
                    "'{}' is not one of {}",
                    self.mirror.log_level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }
        if let Some(db) = &self.catalog.db_path {
            // Attachment links point below the database's directory.
            if !db.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: "catalog.db_path".into(),
                    detail: format!("'{}' is not an absolute path", db.display()),
                });
            }
            if let (Some(dest), Some(db_dir)) = (&self.mirror.dest, db.parent()) {
                if db_dir.starts_with(dest) {
                    return Err(ConfigError::InvalidValue {
                        field: "catalog.db_path".into(),
                        detail: "the catalog database must not live inside the destination tree"
                            .into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Convenience: load, expand, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# reftree configuration

[mirror]
dest = "~/Papers"
poll_interval_secs = 10
log_level = "warn"
dry_run = false
run_once = false
# state_dir = "~/.local/share/reftree"  # auto-detected

[catalog]
# db_path = "~/Zotero/zotero.sqlite"  # searched for when unset
flavor = "any"                         # any | standalone | browser
require_app_running = true
"#
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Anchor a relative path at the current working directory.
pub fn make_absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[mirror]
dest = "/srv/papers"
poll_interval_secs = 30
log_level = "debug"
dry_run = true
state_dir = "/tmp/reftree-state"

[catalog]
db_path = "/home/jdoe/Zotero/zotero.sqlite"
flavor = "standalone"
require_app_running = false
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.mirror.dest, Some(PathBuf::from("/srv/papers")));
        assert_eq!(config.mirror.poll_interval_secs, 30);
        assert!(config.mirror.dry_run);
        assert!(!config.mirror.run_once);
        assert_eq!(config.catalog.flavor, ProfileFlavor::Standalone);
        assert!(!config.catalog.require_app_running);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.mirror.dest, None);
        assert_eq!(config.mirror.poll_interval_secs, 10);
        assert_eq!(config.mirror.log_level, "warn");
        assert!(!config.mirror.dry_run);
        assert_eq!(config.catalog.flavor, ProfileFlavor::Any);
        assert!(config.catalog.require_app_running);
        assert!(config.catalog.db_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reftree.toml");
        std::fs::write(&path, sample_toml()).unwrap();

        let config = AppConfig::load_and_resolve(&path).expect("load failed");
        assert_eq!(config.mirror.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/reftree.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[mirror\ndest = 1").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_requires_dest() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "mirror.dest"
        ));
    }

    #[test]
    fn test_validate_rejects_relative_dest() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.mirror.dest = Some(PathBuf::from("papers"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "mirror.dest"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_poll() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.mirror.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.mirror.log_level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "mirror.log_level"
        ));
    }

    #[test]
    fn test_validate_rejects_database_inside_destination() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.catalog.db_path = Some(PathBuf::from("/srv/papers/zotero/zotero.sqlite"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "catalog.db_path"
        ));
    }

    #[test]
    fn test_validate_rejects_relative_database() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.catalog.db_path = Some(PathBuf::from("Zotero/zotero.sqlite"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "catalog.db_path"
        ));
    }

    #[test]
    fn test_expand_paths_anchors_relative_database() {
        let cwd = std::env::current_dir().unwrap();
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.catalog.db_path = Some(PathBuf::from("Zotero/zotero.sqlite"));
        config.expand_paths();
        assert_eq!(
            config.catalog.db_path,
            Some(cwd.join("Zotero/zotero.sqlite"))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_relative_database_inside_destination_is_rejected() {
        let cwd = std::env::current_dir().unwrap();
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.mirror.dest = Some(cwd);
        config.catalog.db_path = Some(PathBuf::from("Zotero/zotero.sqlite"));
        config.expand_paths();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "catalog.db_path"
        ));
    }

    #[test]
    fn test_make_absolute() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(make_absolute(Path::new("/abs")).unwrap(), PathBuf::from("/abs"));
        assert_eq!(make_absolute(Path::new("rel/x")).unwrap(), cwd.join("rel/x"));
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde(Path::new("~/Papers")), home.join("Papers"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
        assert_eq!(expand_tilde(Path::new("rel/~")), PathBuf::from("rel/~"));
    }

    #[test]
    fn test_default_template_is_valid() {
        let mut config: AppConfig = toml::from_str(AppConfig::default_template())
            .expect("default template should be valid TOML");
        config.expand_paths();
        config.validate().expect("default template should validate");
    }
}
