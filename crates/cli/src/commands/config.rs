//! Configuration commands

use std::path::Path;

use anyhow::{Context, Result};
use swipefeed::config::Config;

/// Show the effective configuration
pub async fn cmd_config_show(config: &Config, explicit: Option<&Path>) -> Result<()> {
  let user_config = Config::user_config_path();

  match explicit {
    Some(path) => println!("Using config: {}", path.display()),
    None if user_config.exists() => println!("Using user config: {}", user_config.display()),
    None => println!("Using default configuration (no config file found)"),
  }
  println!();

  let toml_str = toml::to_string_pretty(config).context("Failed to render config")?;
  println!("{}", toml_str);

  Ok(())
}

/// Write the default configuration to the user config path
pub async fn cmd_config_init(force: bool) -> Result<()> {
  let path = Config::user_config_path();

  if path.exists() && !force {
    anyhow::bail!(
      "Config file already exists: {} (pass --force to overwrite)",
      path.display()
    );
  }

  Config::write_template(&path).with_context(|| format!("Failed to write {}", path.display()))?;
  println!("Created config: {}", path.display());
  println!("Edit the file to customize settings.");

  Ok(())
}
