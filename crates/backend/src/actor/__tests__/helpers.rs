//! Test doubles for the feed controller and the prefetch pipeline.
//!
//! `ScriptedLoader` hands out in-memory media handles whose playback state can
//! be inspected after the fact; loads can be held back or made to fail.
//! `ScriptedSource` pages through a fixed list of items. `FeedHarness` wires
//! both to a controller over an in-memory seen-filter.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
  actor::{
    controller::AdvanceController,
    handle::ControllerHandle,
    message::{AdvanceOutcome, FeedStatus},
  },
  domain::{config::Config, item::Item},
  feed::{FeedPage, FeedSource, FetchError},
  filter::{FilterStore, MemoryPersistence},
  media::{MediaError, MediaHandle, MediaLoader, SlotPhase},
};

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn item(id: &str) -> Item {
  Item {
    id: id.to_string(),
    media_ref: format!("media://{id}"),
    description: format!("clip {id}"),
    creator: "tester".into(),
    created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
  }
}

pub fn items(ids: &[&str]) -> Vec<Item> {
  ids.iter().map(|id| item(id)).collect()
}

/// Poll `condition` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
  let deadline = tokio::time::Instant::now() + WAIT;
  while tokio::time::Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  condition()
}

// ============================================================================
// Media
// ============================================================================

/// Last observed state of a scripted handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
  pub volume: f32,
  pub playing: bool,
  pub looping: bool,
  pub position: Duration,
}

impl Default for Playback {
  fn default() -> Self {
    Self {
      volume: 1.0,
      playing: false,
      looping: false,
      position: Duration::ZERO,
    }
  }
}

type PlaybackMap = Arc<Mutex<HashMap<String, Playback>>>;

struct ScriptedHandle {
  media_ref: String,
  playback: PlaybackMap,
  live: Arc<AtomicUsize>,
}

impl ScriptedHandle {
  fn update(&self, f: impl FnOnce(&mut Playback)) {
    let mut map = self.playback.lock().unwrap();
    f(map.entry(self.media_ref.clone()).or_default());
  }
}

impl MediaHandle for ScriptedHandle {
  fn seek(&mut self, position: Duration) {
    self.update(|p| p.position = position);
  }

  fn play(&mut self) {
    self.update(|p| p.playing = true);
  }

  fn pause(&mut self) {
    self.update(|p| p.playing = false);
  }

  fn set_volume(&mut self, volume: f32) {
    self.update(|p| p.volume = volume);
  }

  fn set_looping(&mut self, looping: bool) {
    self.update(|p| p.looping = looping);
  }
}

impl Drop for ScriptedHandle {
  fn drop(&mut self) {
    self.live.fetch_sub(1, Ordering::SeqCst);
  }
}

/// Media loader with per-ref failure scripts and a shared release gate.
pub struct ScriptedLoader {
  calls: AtomicUsize,
  live: Arc<AtomicUsize>,
  playback: PlaybackMap,
  failures: Mutex<HashMap<String, u32>>,
  held: Mutex<HashSet<String>>,
  gate: Semaphore,
  load_log: Mutex<Vec<String>>,
}

impl ScriptedLoader {
  pub fn new() -> Self {
    Self {
      calls: AtomicUsize::new(0),
      live: Arc::new(AtomicUsize::new(0)),
      playback: Arc::new(Mutex::new(HashMap::new())),
      failures: Mutex::new(HashMap::new()),
      held: Mutex::new(HashSet::new()),
      gate: Semaphore::new(0),
      load_log: Mutex::new(Vec::new()),
    }
  }

  /// Loads started so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Media refs in the order their loads started.
  pub fn loaded_refs(&self) -> Vec<String> {
    self.load_log.lock().unwrap().clone()
  }

  /// Handles handed out and not yet dropped.
  pub fn live_handles(&self) -> usize {
    self.live.load(Ordering::SeqCst)
  }

  pub fn playback(&self, media_ref: &str) -> Option<Playback> {
    self.playback.lock().unwrap().get(media_ref).copied()
  }

  /// Loads of `media_ref` block until [`release`](Self::release) is called.
  pub fn hold(&self, media_ref: &str) {
    self.held.lock().unwrap().insert(media_ref.to_string());
  }

  /// Let `n` held loads through.
  pub fn release(&self, n: usize) {
    self.gate.add_permits(n);
  }

  /// The next `times` loads of `media_ref` fail.
  pub fn fail_times(&self, media_ref: &str, times: u32) {
    self.failures.lock().unwrap().insert(media_ref.to_string(), times);
  }
}

#[async_trait]
impl MediaLoader for ScriptedLoader {
  async fn load(&self, media_ref: &str) -> Result<Box<dyn MediaHandle>, MediaError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.load_log.lock().unwrap().push(media_ref.to_string());

    let held = self.held.lock().unwrap().contains(media_ref);
    if held {
      self.gate.acquire().await.unwrap().forget();
    }

    {
      let mut failures = self.failures.lock().unwrap();
      if let Some(remaining) = failures.get_mut(media_ref)
        && *remaining > 0
      {
        *remaining -= 1;
        return Err(MediaError::Network(format!("scripted failure for {media_ref}")));
      }
    }

    self.live.fetch_add(1, Ordering::SeqCst);
    self.playback.lock().unwrap().insert(media_ref.to_string(), Playback::default());
    Ok(Box::new(ScriptedHandle {
      media_ref: media_ref.to_string(),
      playback: Arc::clone(&self.playback),
      live: Arc::clone(&self.live),
    }))
  }
}

// ============================================================================
// Feed source
// ============================================================================

/// Feed source over a fixed list, paged with an offset cursor.
pub struct ScriptedSource {
  items: Mutex<Vec<Item>>,
  calls: AtomicUsize,
  cursors: Mutex<Vec<Option<String>>>,
  failures: AtomicUsize,
  held: AtomicBool,
  gate: Semaphore,
}

impl ScriptedSource {
  pub fn new(items: Vec<Item>) -> Self {
    Self {
      items: Mutex::new(items),
      calls: AtomicUsize::new(0),
      cursors: Mutex::new(Vec::new()),
      failures: AtomicUsize::new(0),
      held: AtomicBool::new(false),
      gate: Semaphore::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Cursor passed to each fetch, in order.
  pub fn cursors(&self) -> Vec<Option<String>> {
    self.cursors.lock().unwrap().clone()
  }

  /// Prepend newer items, as if they were just published.
  pub fn publish(&self, newer: Vec<Item>) {
    let mut items = self.items.lock().unwrap();
    let older = std::mem::take(&mut *items);
    items.extend(newer);
    items.extend(older);
  }

  /// The next `times` fetches fail.
  pub fn fail_times(&self, times: usize) {
    self.failures.store(times, Ordering::SeqCst);
  }

  /// Fetches block until [`release`](Self::release) is called.
  pub fn hold(&self) {
    self.held.store(true, Ordering::SeqCst);
  }

  pub fn release(&self, n: usize) {
    self.gate.add_permits(n);
  }
}

#[async_trait]
impl FeedSource for ScriptedSource {
  async fn fetch_candidates(&self, limit: usize, cursor: Option<String>) -> Result<FeedPage, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.cursors.lock().unwrap().push(cursor.clone());

    if self.held.load(Ordering::SeqCst) {
      self.gate.acquire().await.unwrap().forget();
    }

    let failed = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if failed {
      return Err(FetchError::Unavailable("scripted outage".into()));
    }

    let offset = match cursor {
      Some(c) => c.parse::<usize>().map_err(|_| FetchError::InvalidCursor(c))?,
      None => 0,
    };
    let items = self.items.lock().unwrap();
    let start = offset.min(items.len());
    let end = (start + limit).min(items.len());
    Ok(FeedPage {
      items: items[start..end].to_vec(),
      next_cursor: (end < items.len()).then(|| end.to_string()),
    })
  }
}

// ============================================================================
// Controller harness
// ============================================================================

/// Config with fast readiness polling and near-instant retries.
pub fn test_config() -> Config {
  let mut config = Config::default();
  config.filter.size = 4_096;
  config.filter.hash_count = 3;
  config.feed.fetch_limit = 10;
  config.feed.low_water_mark = 3;
  config.pipeline.readiness_poll_ms = 10;
  config.pipeline.max_load_attempts = 3;
  config.pipeline.retry_backoff_ms = 1;
  config.pipeline.max_backoff_ms = 5;
  config
}

pub struct FeedHarness {
  pub handle: ControllerHandle,
  pub filter: Arc<FilterStore>,
  pub loader: Arc<ScriptedLoader>,
  pub source: Arc<ScriptedSource>,
  pub persistence: Arc<MemoryPersistence>,
  pub cancel: CancellationToken,
}

impl FeedHarness {
  pub fn start(source: ScriptedSource) -> Self {
    Self::start_with(test_config(), source, ScriptedLoader::new(), MemoryPersistence::new())
  }

  pub fn start_with(
    config: Config,
    source: ScriptedSource,
    loader: ScriptedLoader,
    persistence: MemoryPersistence,
  ) -> Self {
    let loader = Arc::new(loader);
    let source = Arc::new(source);
    let persistence = Arc::new(persistence);
    let cancel = CancellationToken::new();

    let (handle, filter) = AdvanceController::start(
      &config,
      persistence.clone(),
      source.clone(),
      loader.clone(),
      cancel.clone(),
    )
    .expect("valid filter config");

    Self {
      handle,
      filter,
      loader,
      source,
      persistence,
      cancel,
    }
  }

  /// Wait for a published status matching `predicate`.
  pub async fn wait_for(&self, predicate: impl FnMut(&FeedStatus) -> bool) -> FeedStatus {
    tokio::time::timeout(WAIT, self.handle.wait_for(predicate))
      .await
      .expect("status condition not reached in time")
      .expect("controller alive")
  }

  /// Wait until the next item is primed, advance, and return the id now on
  /// screen. Panics on any other outcome.
  pub async fn advance_to_next(&self) -> String {
    self.wait_for(|s| s.standby_phase == SlotPhase::Ready).await;
    match self.handle.advance(true).await.expect("controller alive") {
      AdvanceOutcome::Advanced { now_playing } => now_playing.id,
      other => panic!("expected to advance, got {:?}", other),
    }
  }
}

impl Drop for FeedHarness {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}
