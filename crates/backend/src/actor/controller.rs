//! Feed controller actor
//!
//! Owns the [`FeedQueue`] and the [`PrefetchPipeline`] and is the only task
//! that mutates either. The front of the queue is the item on screen, the
//! second entry is the one primed in standby.
//!
//! # Advance
//!
//! 1. Mark the on-screen item seen and pop it off the queue (together or not at all)
//! 2. If the queue is now empty, tear the pipeline down
//! 3. Otherwise swap standby to active
//! 4. Start loading the item behind the new one
//! 5. Refill the queue if it fell below the low-water mark
//!
//! Steps 4 and 5 only spawn work; their results come back as messages.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
  handle::ControllerHandle,
  message::{AdvanceOutcome, ControllerMessage, FeedStatus, RefillResult},
};
use crate::{
  domain::config::{Config, FeedConfig},
  feed::{FeedQueue, FeedSource},
  filter::{FilterError, FilterPersistence, FilterStore},
  media::{LoadCompletion, LoadFinished, LoadRetryPolicy, MediaLoader, PrefetchPipeline, SlotPhase},
};

pub struct AdvanceController {
  feed: FeedConfig,
  filter: Arc<FilterStore>,
  source: Arc<dyn FeedSource>,
  queue: FeedQueue,
  pipeline: PrefetchPipeline,
  retry: LoadRetryPolicy,
  /// Failed load attempts per queued item
  load_failures: HashMap<String, u32>,
  /// Items dropped after exhausting their load attempts, kept out for the session
  skipped: HashSet<String>,
  cursor: Option<String>,
  /// The source's last pass added nothing new
  caught_up: bool,
  filter_ready: bool,
  commands: mpsc::Receiver<ControllerMessage>,
  loads: mpsc::Receiver<LoadFinished>,
  refill_tx: mpsc::Sender<RefillResult>,
  refills: mpsc::Receiver<RefillResult>,
  status_tx: watch::Sender<FeedStatus>,
  cancel: CancellationToken,
}

impl AdvanceController {
  /// Spawn the controller on the current runtime.
  ///
  /// Kicks off the filter's initial load if nobody has yet; no candidates are
  /// fetched until it finishes.
  pub fn spawn(
    config: &Config,
    filter: Arc<FilterStore>,
    source: Arc<dyn FeedSource>,
    loader: Arc<dyn MediaLoader>,
    cancel: CancellationToken,
  ) -> ControllerHandle {
    let (tx, commands) = mpsc::channel(64);
    let (load_tx, loads) = mpsc::channel(8);
    let (refill_tx, refills) = mpsc::channel(4);
    let (status_tx, status_rx) = watch::channel(FeedStatus::default());

    if !filter.is_loaded() {
      let filter = Arc::clone(&filter);
      tokio::spawn(async move { filter.load().await });
    }

    let controller = Self {
      feed: config.feed.clone(),
      queue: FeedQueue::new(Arc::clone(&filter), config.feed.low_water_mark),
      filter,
      source,
      pipeline: PrefetchPipeline::new(loader, load_tx),
      retry: LoadRetryPolicy::from_config(&config.pipeline),
      load_failures: HashMap::new(),
      skipped: HashSet::new(),
      cursor: None,
      caught_up: false,
      filter_ready: false,
      commands,
      loads,
      refill_tx,
      refills,
      status_tx,
      cancel,
    };

    tokio::spawn(controller.run());
    ControllerHandle::new(tx, status_rx)
  }

  /// Build the filter store from `config` and spawn a controller over it.
  pub fn start(
    config: &Config,
    persistence: Arc<dyn FilterPersistence>,
    source: Arc<dyn FeedSource>,
    loader: Arc<dyn MediaLoader>,
    cancel: CancellationToken,
  ) -> Result<(ControllerHandle, Arc<FilterStore>), FilterError> {
    let filter = Arc::new(FilterStore::new(
      config.filter.clone(),
      persistence,
      Duration::from_millis(config.pipeline.readiness_poll_ms),
    )?);
    let handle = Self::spawn(config, Arc::clone(&filter), source, loader, cancel);
    Ok((handle, filter))
  }

  async fn run(mut self) {
    info!("Feed controller started");
    let mut shutdown_reply: Option<oneshot::Sender<()>> = None;

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          info!("Feed controller shutting down (cancelled)");
          break;
        }

        _ = self.filter.wait_until_loaded(), if !self.filter_ready => {
          self.filter_ready = true;
          debug!("Seen-filter ready, fetching candidates");
          self.maybe_refill();
        }

        Some(finished) = self.loads.recv() => {
          self.on_load_finished(finished);
        }

        Some(refill) = self.refills.recv() => {
          self.on_refill(refill);
        }

        msg = self.commands.recv() => {
          match msg {
            Some(ControllerMessage::Shutdown { reply }) => {
              info!("Feed controller shutting down (requested)");
              shutdown_reply = Some(reply);
              break;
            }
            Some(msg) => self.handle_message(msg),
            None => {
              info!("Feed controller shutting down (all handles dropped)");
              break;
            }
          }
        }
      }

      self.publish_status();
    }

    self.pipeline.teardown();
    self.filter.save().await;
    self.publish_status();

    if let Some(reply) = shutdown_reply {
      let _ = reply.send(());
    }
    info!("Feed controller stopped");
  }

  fn handle_message(&mut self, msg: ControllerMessage) {
    match msg {
      ControllerMessage::Advance { autoplay, reply } => {
        let outcome = self.advance(autoplay);
        let _ = reply.send(outcome);
      }
      ControllerMessage::Status { reply } => {
        let _ = reply.send(self.status());
      }
      ControllerMessage::Refresh => {
        debug!("Refresh requested");
        self.caught_up = false;
        self.cursor = None;
        self.maybe_refill();
      }
      ControllerMessage::SetPlaying { playing } => {
        if playing {
          self.pipeline.play_active();
        } else {
          self.pipeline.pause_active();
        }
      }
      ControllerMessage::Shutdown { .. } => {}
    }
  }

  fn advance(&mut self, autoplay: bool) -> AdvanceOutcome {
    if !self.filter_ready {
      debug!("Advance before seen-filter is ready");
      return AdvanceOutcome::Pending;
    }

    let Some(active_id) = self.pipeline.active_item().map(|item| item.id.clone()) else {
      // Nothing on screen yet: promote the primed front item
      if self.pipeline.standby_phase() == SlotPhase::Ready {
        return self.promote(autoplay);
      }
      self.ensure_prefetch();
      self.maybe_refill();
      if self.caught_up && self.queue.is_empty() && !self.queue.is_refilling() {
        return AdvanceOutcome::CaughtUp;
      }
      return AdvanceOutcome::Pending;
    };

    if self.queue.len() > 1 && self.pipeline.standby_phase() != SlotPhase::Ready {
      trace!(item_id = %active_id, standby = ?self.pipeline.standby_phase(), "Next item not ready");
      self.ensure_prefetch();
      self.maybe_refill();
      return AdvanceOutcome::Pending;
    }

    // Commit: the on-screen item is consumed
    self.filter.mark_seen(&active_id);
    let popped = self.queue.pop_front();
    debug_assert_eq!(popped.as_ref().map(|item| item.id.as_str()), Some(active_id.as_str()));
    self.load_failures.remove(&active_id);
    self.filter.schedule_save();
    debug!(item_id = %active_id, queue_len = self.queue.len(), "Marked seen");

    if self.queue.is_empty() {
      self.pipeline.teardown();
      self.maybe_refill();
      return if self.queue.is_refilling() {
        AdvanceOutcome::Drained
      } else {
        AdvanceOutcome::CaughtUp
      };
    }

    self.promote(autoplay)
  }

  /// Swap the ready standby item on screen and start priming the next one.
  fn promote(&mut self, autoplay: bool) -> AdvanceOutcome {
    let outcome = match self.pipeline.swap(autoplay) {
      Ok(now_playing) => {
        debug_assert_eq!(self.queue.peek_front().map(|item| &item.id), Some(&now_playing.id));
        info!(item_id = %now_playing.id, autoplay, "Now playing");
        AdvanceOutcome::Advanced { now_playing }
      }
      Err(e) => {
        warn!(error = %e, "Swap refused");
        AdvanceOutcome::Pending
      }
    };

    self.ensure_prefetch();
    self.maybe_refill();
    outcome
  }

  /// Start loading whichever item should be in standby, if it is empty.
  fn ensure_prefetch(&mut self) {
    if self.pipeline.standby_phase() != SlotPhase::Empty {
      return;
    }

    let next = if self.pipeline.active_item().is_none() {
      self.queue.peek_front()
    } else {
      self.queue.peek_second()
    };
    let Some(item) = next.cloned() else {
      return;
    };

    let failures = self.load_failures.get(&item.id).copied().unwrap_or(0);
    let delay = self.retry.delay_before(failures);
    self.pipeline.request_load_after(item, delay);
  }

  fn on_load_finished(&mut self, finished: LoadFinished) {
    match self.pipeline.complete_load(finished) {
      LoadCompletion::Ready(item) => {
        self.load_failures.remove(&item.id);
      }
      LoadCompletion::Failed { item, error } => {
        let failures = {
          let count = self.load_failures.entry(item.id.clone()).or_insert(0);
          *count += 1;
          *count
        };

        if !self.retry.allows_retry(failures) {
          warn!(item_id = %item.id, failures, error = %error, "Skipping item that keeps failing to load");
          self.queue.remove(&item.id);
          self.load_failures.remove(&item.id);
          self.skipped.insert(item.id);
          self.maybe_refill();
        } else {
          debug!(item_id = %item.id, failures, "Retrying load");
        }
        self.ensure_prefetch();
      }
      LoadCompletion::Discarded => {}
    }
  }

  /// Spawn a fetch if the queue is low and none is running.
  fn maybe_refill(&mut self) {
    if !self.filter_ready || self.caught_up || !self.queue.needs_refill() {
      return;
    }
    if !self.queue.try_begin_refill() {
      trace!("Refill already in flight");
      return;
    }

    let source = Arc::clone(&self.source);
    let tx = self.refill_tx.clone();
    let limit = self.feed.fetch_limit;
    let cursor = self.cursor.clone();
    debug!(limit, cursor = ?cursor, queue_len = self.queue.len(), "Requesting candidates");

    tokio::spawn(async move {
      let result = source.fetch_candidates(limit, cursor).await;
      let _ = tx.send(RefillResult { result }).await;
    });
  }

  fn on_refill(&mut self, refill: RefillResult) {
    self.queue.finish_refill();

    let page = match refill.result {
      Ok(page) => page,
      Err(e) => {
        // Queue unchanged; the next advance tries again
        warn!(error = %e, "Refill failed");
        return;
      }
    };

    let mut candidates = page.items;
    candidates.retain(|item| !self.skipped.contains(&item.id));
    let outcome = self.queue.refill(candidates);
    let has_more = page.next_cursor.is_some();
    self.cursor = page.next_cursor;

    if outcome.appended > 0 {
      self.caught_up = false;
    } else if !has_more {
      info!(exhausted = outcome.exhausted, "All caught up");
      self.caught_up = true;
    }

    if outcome.exhausted && has_more {
      debug!("Page was entirely seen, reading the next one");
    }

    self.ensure_prefetch();
    if has_more {
      self.maybe_refill();
    }
  }

  fn status(&self) -> FeedStatus {
    FeedStatus {
      filter_loaded: self.filter_ready,
      queue_len: self.queue.len(),
      active: self.pipeline.active_item().map(|item| item.id.clone()),
      standby: self.pipeline.standby_item().map(|item| item.id.clone()),
      standby_phase: self.pipeline.standby_phase(),
      refilling: self.queue.is_refilling(),
      caught_up: self.caught_up && self.queue.is_empty(),
    }
  }

  fn publish_status(&self) {
    let status = self.status();
    self.status_tx.send_if_modified(|current| {
      if *current == status {
        return false;
      }
      *current = status;
      true
    });
  }
}
