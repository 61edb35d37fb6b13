//! Process-wide owner of the seen-filter and its load/save lifecycle.

use std::{
  sync::{
    Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, trace, warn};

use super::{
  persist::FilterPersistence,
  seen::{FilterError, SeenFilter},
};
use crate::domain::config::FilterConfig;

/// Point-in-time view of the filter for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStats {
  pub size: usize,
  pub hash_count: u32,
  pub bits_used: usize,
  pub estimated_fpp: f64,
  pub loaded: bool,
}

#[derive(Debug)]
struct StoreState {
  filter: SeenFilter,
  /// Ids marked before the initial load finished, replayed into the loaded filter
  pending: Vec<String>,
  loaded: bool,
}

/// Owns the single long-lived [`SeenFilter`].
///
/// Readiness is an explicit one-shot signal: `is_loaded()` flips to true once
/// the initial load attempt finishes (successfully or by falling back to an
/// empty filter) and never flips back.
pub struct FilterStore {
  state: RwLock<StoreState>,
  blank: SeenFilter,
  config: FilterConfig,
  persistence: Arc<dyn FilterPersistence>,
  loaded_tx: watch::Sender<bool>,
  load_started: AtomicBool,
  save_lock: Mutex<()>,
  readiness_poll: Duration,
  created: Instant,
}

impl FilterStore {
  /// Fails fast on an invalid filter geometry.
  pub fn new(
    config: FilterConfig,
    persistence: Arc<dyn FilterPersistence>,
    readiness_poll: Duration,
  ) -> Result<Self, FilterError> {
    let blank = SeenFilter::from_config(&config)?;
    let (loaded_tx, _) = watch::channel(false);

    Ok(Self {
      state: RwLock::new(StoreState {
        filter: blank.clone(),
        pending: Vec::new(),
        loaded: false,
      }),
      blank,
      config,
      persistence,
      loaded_tx,
      load_started: AtomicBool::new(false),
      save_lock: Mutex::new(()),
      readiness_poll,
      created: Instant::now(),
    })
  }

  fn read(&self) -> RwLockReadGuard<'_, StoreState> {
    // Bits are monotonic, so a panic mid-update cannot leave them inconsistent
    self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
    self.state.write().unwrap_or_else(|e| e.into_inner())
  }

  /// Run the initial load. Only the first call does anything.
  pub async fn load(&self) {
    if self.load_started.swap(true, Ordering::SeqCst) {
      trace!("Filter load already started");
      return;
    }

    let mut filter = match self.persistence.load_filter_bytes().await {
      Ok(Some(bytes)) => SeenFilter::deserialize(&bytes, &self.config),
      Ok(None) => {
        info!("No saved seen-filter, starting empty");
        self.blank.clone()
      }
      Err(e) => {
        warn!(error = %e, "Failed to load seen-filter, starting empty");
        self.blank.clone()
      }
    };

    if filter.size() != self.blank.size() || filter.hash_count() != self.blank.hash_count() {
      info!(
        saved_size = filter.size(),
        saved_hash_count = filter.hash_count(),
        "Keeping saved filter geometry over configured one"
      );
    }

    {
      let mut state = self.write();
      let replayed = state.pending.len();
      for id in state.pending.drain(..) {
        filter.add(&id);
      }
      state.filter = filter;
      state.loaded = true;
      debug!(
        replayed,
        bits_used = state.filter.bits_used(),
        "Seen-filter loaded"
      );
    }

    self.loaded_tx.send_replace(true);
  }

  pub fn is_loaded(&self) -> bool {
    *self.loaded_tx.borrow()
  }

  /// Wait for the initial load to finish. No timeout: feed progress blocks
  /// rather than risk showing seen items again.
  pub async fn wait_until_loaded(&self) {
    let mut rx = self.loaded_tx.subscribe();

    loop {
      let ready = tokio::time::timeout(self.readiness_poll, async {
        rx.wait_for(|loaded| *loaded).await.map(|_| ())
      })
      .await;

      match ready {
        Ok(_) => return,
        Err(_) => {
          let waited = self.waiting_for().unwrap_or_default();
          trace!(waited_ms = waited.as_millis() as u64, "Still waiting for seen-filter");
        }
      }
    }
  }

  /// Time since the store was created, while the initial load is still
  /// outstanding. Independent of how many times a wait was started.
  pub fn waiting_for(&self) -> Option<Duration> {
    (!self.is_loaded()).then(|| self.created.elapsed())
  }

  /// A receiver that observes the readiness flag.
  pub fn subscribe_loaded(&self) -> watch::Receiver<bool> {
    self.loaded_tx.subscribe()
  }

  pub fn mark_seen(&self, id: &str) {
    let mut state = self.write();
    state.filter.add(id);
    if !state.loaded {
      state.pending.push(id.to_string());
    }
  }

  pub fn might_contain(&self, id: &str) -> bool {
    self.read().filter.might_contain(id)
  }

  pub fn stats(&self) -> FilterStats {
    let state = self.read();
    FilterStats {
      size: state.filter.size(),
      hash_count: state.filter.hash_count(),
      bits_used: state.filter.bits_used(),
      estimated_fpp: state.filter.estimated_fpp(),
      loaded: state.loaded,
    }
  }

  /// Persist the current filter. Saves are serialized and each one snapshots
  /// the filter after taking its turn, so the last write is always the newest.
  /// Failures are logged and swallowed.
  pub async fn save(&self) {
    let _turn = self.save_lock.lock().await;

    let bytes = {
      let state = self.read();
      if !state.loaded {
        debug!("Skipping filter save before initial load");
        return;
      }
      state.filter.serialize()
    };

    let len = bytes.len();
    match self.persistence.save_filter_bytes(bytes).await {
      Ok(()) => trace!(len, "Seen-filter saved"),
      Err(e) => warn!(error = %e, "Failed to save seen-filter"),
    }
  }

  /// Fire-and-forget save on the current runtime.
  pub fn schedule_save(self: &Arc<Self>) {
    let store = Arc::clone(self);
    tokio::spawn(async move {
      store.save().await;
    });
  }
}

impl std::fmt::Debug for FilterStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FilterStore")
      .field("loaded", &self.is_loaded())
      .field("size", &self.blank.size())
      .field("hash_count", &self.blank.hash_count())
      .finish()
  }
}
