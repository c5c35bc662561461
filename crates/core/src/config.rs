//! TOML-based configuration for the FitRec core.
//!
//! All knobs have serde defaults, so an empty file (or no file at all, via
//! [`AppConfig::load_or_default`]) yields a working configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Duplicate-detection tolerances.
    #[serde(default)]
    pub dedup: DedupSettings,

    /// Conflict-detection thresholds.
    #[serde(default)]
    pub conflict: ConflictSettings,

    /// Audit-trail retention and undo settings.
    #[serde(default)]
    pub audit: AuditSettings,
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

/// Tolerances for the duplicate detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    /// Start times further apart than twice this stop contributing (default 5).
    #[serde(default = "default_time_tolerance")]
    pub time_tolerance_minutes: u32,

    /// Duration differences further apart than twice this stop contributing
    /// (default 2).
    #[serde(default = "default_duration_tolerance")]
    pub duration_tolerance_minutes: u32,

    /// Minimum normalized name similarity for the name component to count
    /// (default 0.8).
    #[serde(default = "default_name_match_threshold")]
    pub name_match_threshold: f64,
}

fn default_time_tolerance() -> u32 {
    5
}
fn default_duration_tolerance() -> u32 {
    2
}
fn default_name_match_threshold() -> f64 {
    0.8
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            time_tolerance_minutes: default_time_tolerance(),
            duration_tolerance_minutes: default_duration_tolerance(),
            name_match_threshold: default_name_match_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// Thresholds for the conflict detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSettings {
    /// Minimum interval overlap, in minutes, for a manual/synced pair to be
    /// flagged (default 5).
    #[serde(default = "default_min_overlap")]
    pub min_overlap_minutes: u32,
}

fn default_min_overlap() -> u32 {
    5
}

impl Default for ConflictSettings {
    fn default() -> Self {
        Self {
            min_overlap_minutes: default_min_overlap(),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Audit-trail retention and undo settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Rolling cap: cleanup trims the trail down to this many records
    /// (default 100).
    #[serde(default = "default_max_records")]
    pub max_records: usize,

    /// Cleanup runs once the trail reaches this count (default 120).
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: usize,

    /// Optional age-based expiry. Parsed but not wired to deletion: the
    /// rolling cap is the authoritative cleanup mechanism.
    #[serde(default)]
    pub retention_days: Option<u32>,

    /// How long an operation stays undoable, in hours (default 24).
    #[serde(default = "default_undo_window_hours")]
    pub undo_window_hours: i64,
}

fn default_max_records() -> usize {
    100
}
fn default_cleanup_threshold() -> usize {
    120
}
fn default_undo_window_hours() -> i64 {
    24
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            cleanup_threshold: default_cleanup_threshold(),
            retention_days: None,
            undo_window_hours: default_undo_window_hours(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
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

    /// Load from a file if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let config = Self::load_from_file(path)?;
            config.validate()?;
            Ok(config)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit.max_records == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audit.max_records".into(),
                detail: "must be > 0".into(),
            });
        }
        if self.audit.cleanup_threshold < self.audit.max_records {
            return Err(ConfigError::InvalidValue {
                field: "audit.cleanup_threshold".into(),
                detail: "must be >= audit.max_records".into(),
            });
        }
        if self.audit.undo_window_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "audit.undo_window_hours".into(),
                detail: "must be > 0".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.dedup.name_match_threshold)
            || self.dedup.name_match_threshold == 0.0
        {
            return Err(ConfigError::InvalidValue {
                field: "dedup.name_match_threshold".into(),
                detail: "must be in (0, 1]".into(),
            });
        }
        if self.conflict.min_overlap_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "conflict.min_overlap_minutes".into(),
                detail: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[dedup]
time_tolerance_minutes = 10
duration_tolerance_minutes = 3
name_match_threshold = 0.75

[conflict]
min_overlap_minutes = 8

[audit]
max_records = 200
cleanup_threshold = 250
retention_days = 90
undo_window_hours = 48
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.dedup.time_tolerance_minutes, 10);
        assert_eq!(config.dedup.name_match_threshold, 0.75);
        assert_eq!(config.conflict.min_overlap_minutes, 8);
        assert_eq!(config.audit.max_records, 200);
        assert_eq!(config.audit.retention_days, Some(90));
        assert_eq!(config.audit.undo_window_hours, 48);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.dedup.time_tolerance_minutes, 5);
        assert_eq!(config.dedup.duration_tolerance_minutes, 2);
        assert_eq!(config.dedup.name_match_threshold, 0.8);
        assert_eq!(config.conflict.min_overlap_minutes, 5);
        assert_eq!(config.audit.max_records, 100);
        assert_eq!(config.audit.cleanup_threshold, 120);
        assert_eq!(config.audit.retention_days, None);
        assert_eq!(config.audit.undo_window_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fitrec.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.audit.cleanup_threshold, 250);
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/fitrec.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.audit.max_records, 100);
    }

    #[test]
    fn test_validate_rejects_inverted_cap() {
        let mut config = AppConfig::default();
        config.audit.cleanup_threshold = 50; // below max_records
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "audit.cleanup_threshold"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = AppConfig::default();
        config.dedup.name_match_threshold = 1.5;
        assert!(config.validate().is_err());
        config.dedup.name_match_threshold = 0.0;
        assert!(config.validate().is_err());
    }
}
