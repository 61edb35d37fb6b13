//! Bloom filter over previously shown item ids.
//!
//! Bit positions come from SHA-256 over the raw id bytes followed by the
//! little-endian seed, so the same id selects the same bits on every run and
//! on every platform. The first 8 digest bytes are reduced modulo `size`.
//!
//! ## Serialized format (little-endian)
//!
//! ```text
//! "SEEN" | version: u8 | hash_count: u32 | size: u64 | bits: ceil(size/8) bytes
//! ```
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8`. Padding bits past `size`
//! must be zero.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::config::{FilterConfig, optimal_geometry};

const MAGIC: &[u8; 4] = b"SEEN";
const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 8;
/// Upper bound on hash functions accepted from persisted bytes.
const MAX_HASH_COUNT: u32 = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
  #[error("Invalid filter configuration: size={size}, hash_count={hash_count}")]
  InvalidConfig { size: usize, hash_count: u32 },
  #[error("Malformed filter bytes: {0}")]
  Decode(String),
}

/// Fixed-size probabilistic set of seen ids.
///
/// `size` and `hash_count` never change after construction. Bits only ever go
/// from clear to set, which is what rules out false negatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenFilter {
  words: Vec<u64>,
  size: usize,
  hash_count: u32,
}

impl SeenFilter {
  pub fn new(size: usize, hash_count: u32) -> Result<Self, FilterError> {
    if size == 0 || hash_count == 0 {
      return Err(FilterError::InvalidConfig { size, hash_count });
    }
    Ok(Self {
      words: vec![0; size.div_ceil(64)],
      size,
      hash_count,
    })
  }

  /// Build a filter sized for `expected_items` at the given false positive rate.
  pub fn with_accuracy(expected_items: u64, false_positive_rate: f64) -> Result<Self, FilterError> {
    if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
      return Err(FilterError::InvalidConfig { size: 0, hash_count: 0 });
    }
    let (size, hash_count) = optimal_geometry(expected_items, false_positive_rate);
    Self::new(size, hash_count)
  }

  pub fn from_config(config: &FilterConfig) -> Result<Self, FilterError> {
    let (size, hash_count) = config.geometry();
    Self::new(size, hash_count)
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn hash_count(&self) -> u32 {
    self.hash_count
  }

  /// The bit positions `id` maps to, one per seed.
  pub fn bit_indices(&self, id: &str) -> impl Iterator<Item = usize> + '_ {
    let id = id.as_bytes().to_vec();
    (0..self.hash_count).map(move |seed| bit_index(&id, seed, self.size))
  }

  pub fn add(&mut self, id: &str) {
    for seed in 0..self.hash_count {
      let index = bit_index(id.as_bytes(), seed, self.size);
      self.words[index / 64] |= 1 << (index % 64);
    }
  }

  pub fn might_contain(&self, id: &str) -> bool {
    (0..self.hash_count).all(|seed| {
      let index = bit_index(id.as_bytes(), seed, self.size);
      self.words[index / 64] & (1 << (index % 64)) != 0
    })
  }

  /// Number of set bits.
  pub fn bits_used(&self) -> usize {
    self.words.iter().map(|w| w.count_ones() as usize).sum()
  }

  /// False positive probability implied by the current fill ratio.
  pub fn estimated_fpp(&self) -> f64 {
    let fill = self.bits_used() as f64 / self.size as f64;
    fill.powf(f64::from(self.hash_count))
  }

  pub fn is_empty(&self) -> bool {
    self.words.iter().all(|w| *w == 0)
  }

  pub fn serialize(&self) -> Vec<u8> {
    let byte_len = self.size.div_ceil(8);
    let mut out = Vec::with_capacity(HEADER_LEN + byte_len);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&self.hash_count.to_le_bytes());
    out.extend_from_slice(&(self.size as u64).to_le_bytes());
    out.extend(self.words.iter().flat_map(|w| w.to_le_bytes()).take(byte_len));
    out
  }

  /// Strict decode; any structural problem is an error.
  pub fn try_deserialize(bytes: &[u8]) -> Result<Self, FilterError> {
    if bytes.len() < HEADER_LEN {
      return Err(FilterError::Decode(format!("{} bytes is shorter than the header", bytes.len())));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if &header[0..4] != MAGIC {
      return Err(FilterError::Decode("bad magic".into()));
    }
    if header[4] != FORMAT_VERSION {
      return Err(FilterError::Decode(format!("unsupported version {}", header[4])));
    }

    let hash_count = u32::from_le_bytes([header[5], header[6], header[7], header[8]]);
    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&header[9..17]);
    let size = usize::try_from(u64::from_le_bytes(size_bytes))
      .map_err(|_| FilterError::Decode("size does not fit in memory".into()))?;

    // Header fields are untrusted until the body agrees with them
    if body.len() != size.div_ceil(8) {
      return Err(FilterError::Decode(format!(
        "expected {} bit bytes, found {}",
        size.div_ceil(8),
        body.len()
      )));
    }
    if hash_count > MAX_HASH_COUNT || hash_count as usize > size {
      return Err(FilterError::Decode(format!(
        "implausible hash_count {hash_count} for size {size}"
      )));
    }

    let mut filter = Self::new(size, hash_count).map_err(|e| FilterError::Decode(e.to_string()))?;

    for (i, chunk) in body.chunks(8).enumerate() {
      let mut word = [0u8; 8];
      word[..chunk.len()].copy_from_slice(chunk);
      filter.words[i] = u64::from_le_bytes(word);
    }

    if size % 64 != 0 {
      let tail_mask = !0u64 << (size % 64);
      if filter.words[size / 64] & tail_mask != 0 {
        return Err(FilterError::Decode("padding bits are set".into()));
      }
    }

    Ok(filter)
  }

  /// Fail-open decode: malformed input yields an empty filter built from
  /// `fallback`. Never errors.
  pub fn deserialize(bytes: &[u8], fallback: &FilterConfig) -> Self {
    match Self::try_deserialize(bytes) {
      Ok(filter) => filter,
      Err(e) => {
        warn!(error = %e, "Discarding unreadable seen-filter, starting empty");
        Self::from_config(fallback).unwrap_or_else(|_| Self::fallback())
      }
    }
  }

  /// Built-in default geometry, used when even the configured one is invalid.
  fn fallback() -> Self {
    let defaults = FilterConfig::default();
    Self {
      words: vec![0; defaults.size.div_ceil(64)],
      size: defaults.size,
      hash_count: defaults.hash_count,
    }
  }
}

fn bit_index(id: &[u8], seed: u32, size: usize) -> usize {
  let mut hasher = Sha256::new();
  hasher.update(id);
  hasher.update(seed.to_le_bytes());
  let digest = hasher.finalize();

  let mut wide = [0u8; 8];
  wide.copy_from_slice(&digest[..8]);
  (u64::from_le_bytes(wide) % size as u64) as usize
}
