use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{NormRefError, Result};
use crate::limiter::permit_interval;
use crate::types::RenderMode;

/// Name of the configuration file stored inside the `.normref` directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Name of the hidden directory used to store resolver settings.
pub const NORMREF_DIR: &str = ".normref";

/// Tunables of the reference resolution pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Schema version of the configuration.
    pub version: u32,
    /// Detections below this confidence go to the low-confidence list.
    pub confidence_threshold: f64,
    /// Maximum recursion depth for sub-reference resolution.
    pub max_depth: usize,
    /// Characters added on each side of a carved span when extraction is retried.
    pub widen_window: usize,
    /// Per-call timeout for the semantic service and document fetches.
    pub call_timeout_ms: u64,
    /// Retries after the first attempt, for retriable failures only.
    pub max_retries: u32,
    /// Linear backoff unit between retries.
    pub retry_backoff_ms: u64,
    /// Aggregate call rate shared by every worker.
    pub requests_per_second: f64,
    /// Wall-clock budget for one fragment pair.
    pub wall_clock_budget_ms: u64,
    /// Upper bound on pending stack entries for one fragment pair.
    pub max_stack_entries: usize,
    /// Whether references judged ambiguous are resolved (with a warning) or skipped.
    pub resolve_ambiguous: bool,
    pub render_mode: RenderMode,
    /// Annotate every occurrence of a reference instead of only the first.
    pub annotate_all_occurrences: bool,
    /// Maximum characters of resolved content shown in a footnote.
    pub footnote_max_len: usize,
    /// Number of fragment pairs processed concurrently.
    pub max_workers: usize,
    /// Ask the semantic service for additional reference detections.
    pub semantic_detection: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            version: 1,
            confidence_threshold: 0.6,
            max_depth: 3,
            widen_window: 300,
            call_timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 250,
            requests_per_second: 5.0,
            wall_clock_budget_ms: 120_000,
            max_stack_entries: 256,
            resolve_ambiguous: true,
            render_mode: RenderMode::Footnote,
            annotate_all_occurrences: false,
            footnote_max_len: 400,
            max_workers: 4,
            semantic_detection: true,
        }
    }
}

impl ResolverConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn wall_clock_budget(&self) -> Duration {
        Duration::from_millis(self.wall_clock_budget_ms)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(NormRefError::Config {
                message: format!(
                    "confidence_threshold must be within [0, 1], got {}",
                    self.confidence_threshold
                ),
            });
        }
        if self.requests_per_second.is_nan() || self.requests_per_second <= 0.0 {
            return Err(NormRefError::Config {
                message: format!(
                    "requests_per_second must be positive, got {}",
                    self.requests_per_second
                ),
            });
        }
        if permit_interval(self.requests_per_second).is_none() {
            return Err(NormRefError::Config {
                message: format!(
                    "requests_per_second {} is too small to schedule",
                    self.requests_per_second
                ),
            });
        }
        if self.max_workers == 0 {
            return Err(NormRefError::Config {
                message: "max_workers must be at least 1".to_string(),
            });
        }
        if self.call_timeout_ms == 0 {
            return Err(NormRefError::Config {
                message: "call_timeout_ms must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Returns the path to the `.normref` directory within the given project root.
pub fn get_normref_dir(project_root: &Path) -> PathBuf {
    project_root.join(NORMREF_DIR)
}

/// Returns the path to the configuration file (`config.json`) within the `.normref` directory.
pub fn get_config_path(project_root: &Path) -> PathBuf {
    get_normref_dir(project_root).join(CONFIG_FILENAME)
}

/// Loads the configuration from disk.
///
/// If the configuration file does not exist, returns the default configuration.
pub fn load_config(project_root: &Path) -> Result<ResolverConfig> {
    let config_path = get_config_path(project_root);

    if !config_path.exists() {
        return Ok(ResolverConfig::default());
    }

    load_config_file(&config_path)
}

/// Loads a configuration file, parsed as TOML when the extension is `.toml`
/// and as JSON otherwise. Missing fields take their default values.
pub fn load_config_file(path: &Path) -> Result<ResolverConfig> {
    let contents = fs::read_to_string(path).map_err(|e| NormRefError::Config {
        message: format!("failed to read config file '{}': {}", path.display(), e),
    })?;

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let config: ResolverConfig = if is_toml {
        toml::from_str(&contents).map_err(|e| NormRefError::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
        })?
    } else {
        serde_json::from_str(&contents).map_err(|e| NormRefError::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
        })?
    };

    config.validate()?;
    Ok(config)
}

/// Saves the configuration to disk using an atomic write.
///
/// Writes to a temporary file first and then renames it to the final location,
/// ensuring that a partial write never corrupts the configuration.
pub fn save_config(project_root: &Path, config: &ResolverConfig) -> Result<()> {
    let normref_dir = get_normref_dir(project_root);
    fs::create_dir_all(&normref_dir).map_err(|e| NormRefError::Config {
        message: format!(
            "failed to create config directory '{}': {}",
            normref_dir.display(),
            e
        ),
    })?;

    let config_path = get_config_path(project_root);
    let tmp_path = config_path.with_extension("tmp");

    let json = serde_json::to_string_pretty(config).map_err(|e| NormRefError::Config {
        message: format!("failed to serialize config: {}", e),
    })?;

    fs::write(&tmp_path, &json).map_err(|e| NormRefError::Config {
        message: format!(
            "failed to write temporary config file '{}': {}",
            tmp_path.display(),
            e
        ),
    })?;

    fs::rename(&tmp_path, &config_path).map_err(|e| NormRefError::Config {
        message: format!(
            "failed to rename temporary config file '{}' to '{}': {}",
            tmp_path.display(),
            config_path.display(),
            e
        ),
    })?;

    Ok(())
}
