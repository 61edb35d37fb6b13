//! Candidate supply for the feed
//!
//! A [`FeedSource`] lists candidate items page by page; [`FeedQueue`] keeps
//! the ordered, deduplicated run of items not yet shown.

mod json_source;
mod queue;

use async_trait::async_trait;

pub use json_source::JsonFileSource;
pub use queue::{FeedQueue, RefillOutcome};

use crate::domain::item::Item;

/// One page of candidates, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
  pub items: Vec<Item>,
  /// Cursor for the following page; `None` when the source has nothing older
  pub next_cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse candidates: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("Invalid cursor: {0}")]
  InvalidCursor(String),
  #[error("Source unavailable: {0}")]
  Unavailable(String),
}

/// The backend query that lists candidate items.
///
/// Implementations return at most `limit` items, ordered newest first, with
/// any server-side status filtering already applied. Records that fail to
/// decode are dropped by the source rather than failing the page.
#[async_trait]
pub trait FeedSource: Send + Sync {
  async fn fetch_candidates(&self, limit: usize, cursor: Option<String>) -> Result<FeedPage, FetchError>;
}
