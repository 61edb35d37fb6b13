//! Persistence collaborators for the seen-filter bytes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Persistence unavailable: {0}")]
  Unavailable(String),
}

/// Where the filter's serialized bytes live between runs.
#[async_trait]
pub trait FilterPersistence: Send + Sync {
  /// Load the last saved bytes; `Ok(None)` when nothing has been saved yet.
  async fn load_filter_bytes(&self) -> Result<Option<Vec<u8>>, PersistenceError>;

  /// Best-effort save of the given bytes.
  async fn save_filter_bytes(&self, bytes: Vec<u8>) -> Result<(), PersistenceError>;
}

/// Stores the filter in a single file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FilePersistence {
  path: PathBuf,
}

impl FilePersistence {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn temp_path(&self) -> PathBuf {
    let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    self.path.with_file_name(name)
  }
}

#[async_trait]
impl FilterPersistence for FilePersistence {
  async fn load_filter_bytes(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
    match tokio::fs::read(&self.path).await {
      Ok(bytes) => {
        debug!(path = %self.path.display(), len = bytes.len(), "Loaded filter bytes");
        Ok(Some(bytes))
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "No saved filter");
        Ok(None)
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn save_filter_bytes(&self, bytes: Vec<u8>) -> Result<(), PersistenceError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }

    let temp = self.temp_path();
    tokio::fs::write(&temp, &bytes).await?;
    tokio::fs::rename(&temp, &self.path).await?;
    trace!(path = %self.path.display(), len = bytes.len(), "Saved filter bytes");
    Ok(())
  }
}

/// Keeps the bytes in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
  bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryPersistence {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_bytes(bytes: Vec<u8>) -> Self {
    Self {
      bytes: Mutex::new(Some(bytes)),
    }
  }

  pub async fn snapshot(&self) -> Option<Vec<u8>> {
    self.bytes.lock().await.clone()
  }
}

#[async_trait]
impl FilterPersistence for MemoryPersistence {
  async fn load_filter_bytes(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
    Ok(self.bytes.lock().await.clone())
  }

  async fn save_filter_bytes(&self, bytes: Vec<u8>) -> Result<(), PersistenceError> {
    *self.bytes.lock().await = Some(bytes);
    Ok(())
  }
}
