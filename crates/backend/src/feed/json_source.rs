use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::{FeedPage, FeedSource, FetchError};
use crate::domain::item::decode_candidates;

/// Serves candidates from a JSON array on disk.
///
/// The file is re-read on every fetch so appended items show up on the next
/// refill. The cursor is the offset into the newest-first ordering.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
  path: PathBuf,
}

impl JsonFileSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl FeedSource for JsonFileSource {
  async fn fetch_candidates(&self, limit: usize, cursor: Option<String>) -> Result<FeedPage, FetchError> {
    let offset = match cursor.as_deref() {
      None => 0,
      Some(raw) => raw
        .parse::<usize>()
        .map_err(|_| FetchError::InvalidCursor(raw.to_string()))?,
    };

    let content = tokio::fs::read(&self.path).await?;
    let raw: Vec<serde_json::Value> = serde_json::from_slice(&content)?;
    let mut items = decode_candidates(raw);
    // Stable, so equal timestamps keep file order
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = items.len();
    let start = offset.min(total);
    let end = start.saturating_add(limit).min(total);
    let page: Vec<_> = items.drain(start..end).collect();
    let next_cursor = (end < total).then(|| end.to_string());

    debug!(
      path = %self.path.display(),
      offset,
      returned = page.len(),
      total,
      "Fetched candidates"
    );

    Ok(FeedPage {
      items: page,
      next_cursor,
    })
  }
}
