use std::path::PathBuf;

/// File name of the persisted seen-filter inside the data directory.
pub const FILTER_FILE_NAME: &str = "seen.filter";

/// Get the default base path for swipefeed data
///
/// Respects the following environment variables (in order of precedence):
/// 1. DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("swipefeed");
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("swipefeed")
}

/// Get the default config directory
///
/// Respects the following environment variables (in order of precedence):
/// 1. CONFIG_DIR - explicit config directory override
/// 2. XDG_CONFIG_HOME - standard XDG config home directory
/// 3. dirs::config_dir() - platform default
pub fn default_config_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("CONFIG_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return PathBuf::from(xdg_config).join("swipefeed");
  }

  dirs::config_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("swipefeed")
}

/// Path of the persisted seen-filter under the default data directory.
pub fn default_filter_path() -> PathBuf {
  default_data_dir().join(FILTER_FILE_NAME)
}
