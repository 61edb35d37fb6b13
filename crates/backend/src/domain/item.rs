use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single feed entry as offered by the backend.
///
/// Items are immutable once fetched; clones are cheap enough for the small
/// number held at once (queue plus two playback slots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
  pub id: String,
  pub media_ref: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub creator: String,
  pub created_at: DateTime<Utc>,
}

/// A candidate record that could not become an [`Item`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
  #[error("Malformed candidate: {0}")]
  Malformed(#[from] serde_json::Error),
  #[error("Candidate has an empty id")]
  EmptyId,
  #[error("Candidate {id} has an empty media_ref")]
  EmptyMediaRef { id: String },
}

impl Item {
  /// Decode and validate a single candidate record.
  pub fn decode(value: serde_json::Value) -> Result<Self, DecodeError> {
    let item: Item = serde_json::from_value(value)?;
    if item.id.trim().is_empty() {
      return Err(DecodeError::EmptyId);
    }
    if item.media_ref.trim().is_empty() {
      return Err(DecodeError::EmptyMediaRef { id: item.id });
    }
    Ok(item)
  }
}

/// Decode a batch of raw candidates, skipping (and logging) each one that fails.
///
/// Order of the surviving items matches the input order.
pub fn decode_candidates(raw: Vec<serde_json::Value>) -> Vec<Item> {
  let total = raw.len();
  let items: Vec<Item> = raw
    .into_iter()
    .enumerate()
    .filter_map(|(index, value)| match Item::decode(value) {
      Ok(item) => Some(item),
      Err(e) => {
        warn!(index, error = %e, "Skipping undecodable candidate");
        None
      }
    })
    .collect();

  if items.len() < total {
    warn!(decoded = items.len(), total, "Dropped candidates that failed to decode");
  }
  items
}
