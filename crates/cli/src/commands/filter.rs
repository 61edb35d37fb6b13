//! Seen-filter inspection commands

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use swipefeed::{
  config::Config,
  filter::{FilePersistence, FilterStore},
};

async fn open_store(config: &Config, path: &Path) -> Result<FilterStore> {
  let store = FilterStore::new(
    config.filter.clone(),
    Arc::new(FilePersistence::new(path)),
    Duration::from_millis(config.pipeline.readiness_poll_ms),
  )
  .context("Invalid seen-filter configuration")?;
  store.load().await;
  Ok(store)
}

/// Show seen-filter statistics
pub async fn cmd_filter_stats(config: &Config, path: &Path, json: bool) -> Result<()> {
  let exists = path.exists();
  let stats = open_store(config, path).await?.stats();

  if json {
    let out = serde_json::json!({
      "path": path.display().to_string(),
      "exists": exists,
      "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    return Ok(());
  }

  println!("Seen-filter");
  println!("===========\n");
  println!("File:           {}", path.display());
  if !exists {
    println!("                (not created yet, showing an empty filter)");
  }
  println!("Size:           {} bits", stats.size);
  println!("Hash count:     {}", stats.hash_count);
  println!(
    "Bits set:       {} ({:.2}%)",
    stats.bits_used,
    stats.bits_used as f64 / stats.size.max(1) as f64 * 100.0
  );
  println!("Est. FP rate:   {:.4}%", stats.estimated_fpp * 100.0);

  Ok(())
}

/// Check ids against the seen-filter
pub async fn cmd_filter_check(config: &Config, path: &Path, ids: &[String]) -> Result<()> {
  let store = open_store(config, path).await?;

  for id in ids {
    let verdict = if store.might_contain(id) {
      "probably seen"
    } else {
      "not seen"
    };
    println!("{id}: {verdict}");
  }

  Ok(())
}

/// Delete the persisted seen-filter
pub async fn cmd_filter_reset(path: &Path) -> Result<()> {
  match tokio::fs::remove_file(path).await {
    Ok(()) => println!("Removed seen-filter: {}", path.display()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      println!("No seen-filter at {}", path.display());
    }
    Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
  }
  Ok(())
}
