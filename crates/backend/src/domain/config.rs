//! Configuration for the feed client.
//!
//! Config priority: explicit path > user (~/.config/swipefeed/config.toml) > defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dirs;

// ============================================================================
// Filter Configuration
// ============================================================================

/// Seen-filter geometry.
///
/// Either set `size`/`hash_count` directly, or set `expected_items` and let the
/// capacity formulas choose both from `false_positive_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
  /// Number of bits in the filter
  pub size: usize,

  /// Number of hash functions (bit positions per id)
  pub hash_count: u32,

  /// Expected lifetime count of distinct items viewed per install.
  /// When set, overrides `size` and `hash_count`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub expected_items: Option<u64>,

  /// Target false positive probability used with `expected_items`
  pub false_positive_rate: f64,
}

impl Default for FilterConfig {
  fn default() -> Self {
    Self {
      size: 10_000,
      hash_count: 3,
      expected_items: None,
      false_positive_rate: 0.01,
    }
  }
}

impl FilterConfig {
  /// Resolve the `(size, hash_count)` pair this config describes.
  pub fn geometry(&self) -> (usize, u32) {
    match self.expected_items {
      Some(n) if n > 0 && self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0 => {
        optimal_geometry(n, self.false_positive_rate)
      }
      _ => (self.size, self.hash_count),
    }
  }
}

/// Standard bloom filter capacity formulas.
///
/// `m = ceil(-n ln p / (ln 2)^2)`, `k = max(1, round(m / n * ln 2))`
pub fn optimal_geometry(expected_items: u64, false_positive_rate: f64) -> (usize, u32) {
  let n = expected_items.max(1) as f64;
  let ln2 = std::f64::consts::LN_2;
  let bits = (-n * false_positive_rate.ln() / (ln2 * ln2)).ceil().max(1.0);
  let hashes = ((bits / n) * ln2).round().max(1.0);
  (bits as usize, hashes as u32)
}

// ============================================================================
// Feed Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
  /// Candidates requested per refill
  pub fetch_limit: usize,

  /// Queue length below which a refill is triggered
  pub low_water_mark: usize,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      fetch_limit: 10,
      low_water_mark: 3,
    }
  }
}

// ============================================================================
// Pipeline Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// How often a readiness waiter wakes up to report that it is still waiting
  pub readiness_poll_ms: u64,

  /// Load attempts per item before it is skipped
  pub max_load_attempts: u32,

  /// Initial delay before retrying a failed load
  pub retry_backoff_ms: u64,

  /// Upper bound on the retry delay
  pub max_backoff_ms: u64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      readiness_poll_ms: 100,
      max_load_attempts: 3,
      retry_backoff_ms: 250,
      max_backoff_ms: 4_000,
    }
  }
}

// ============================================================================
// Log Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Log level: off, error, warn, info, debug, trace
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self { level: "info".into() }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("Failed to render config: {0}")]
  Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub filter: FilterConfig,
  pub feed: FeedConfig,
  pub pipeline: PipelineConfig,
  pub log: LogConfig,
}

impl Config {
  /// Load the config, preferring `explicit` when given, then the user config,
  /// then defaults. Unreadable files fall back with a warning.
  pub fn load(explicit: Option<&Path>) -> Self {
    Self::load_with(explicit, &Self::user_config_path())
  }

  /// Same lookup as [`load`](Self::load) with the user config at `user_path`.
  pub fn load_with(explicit: Option<&Path>, user_path: &Path) -> Self {
    if let Some(path) = explicit {
      match Self::load_from(path) {
        Ok(config) => return config,
        Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable config"),
      }
    }

    if user_path.exists() {
      match Self::load_from(user_path) {
        Ok(config) => return config,
        Err(e) => warn!(path = %user_path.display(), error = %e, "Ignoring unreadable user config"),
      }
    }

    Self::default()
  }

  /// Strictly load a config file.
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
  }

  /// Get the user-level config path
  pub fn user_config_path() -> PathBuf {
    dirs::default_config_dir().join("config.toml")
  }

  /// Render the default configuration as TOML.
  pub fn generate_template() -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(&Self::default())?)
  }

  /// Write the default configuration to `path`, creating parent directories.
  pub fn write_template(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Self::generate_template()?)?;
    Ok(())
  }
}
