//! Double-buffered playback slots.
//!
//! Two fixed slots addressed by a single `active` index. The active slot is
//! on screen; the other one (standby) is the only slot that ever loads. A
//! swap flips the index, so there is never a moment with two active handles
//! or an inconsistent pair.
//!
//! ```text
//! standby:  Empty ──request_load──▶ Loading ──ok──▶ Ready ──swap──▶ (active)
//!             ▲                        │
//!             └──────────err───────────┘
//! ```
//!
//! Loads run on spawned tasks and report back through a [`LoadFinished`]
//! channel; the owner feeds each one to [`PrefetchPipeline::complete_load`].
//! Results that no longer match the slot's current ticket are discarded.

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{MediaError, MediaHandle, MediaLoader};
use crate::domain::item::Item;

/// Volume given to the on-screen handle.
const AUDIBLE: f32 = 1.0;
const MUTED: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotPhase {
  #[default]
  Empty,
  Loading,
  Ready,
}

/// The observable combination of both slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  /// Both slots empty
  Idle,
  /// Nothing on screen yet; the first item is loading or ready in standby
  Priming(SlotPhase),
  /// Active is ready; standby in the given phase
  Playing(SlotPhase),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
  #[error("Standby slot is not ready")]
  StandbyNotReady,
}

/// A fully loaded item and its playable handle.
pub struct LoadedMedia {
  pub item: Item,
  pub handle: Box<dyn MediaHandle>,
}

impl std::fmt::Debug for LoadedMedia {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoadedMedia").field("item", &self.item.id).finish()
  }
}

#[derive(Debug)]
enum Slot {
  Empty,
  Loading { item: Item, ticket: u64 },
  Ready(LoadedMedia),
}

impl Slot {
  fn phase(&self) -> SlotPhase {
    match self {
      Slot::Empty => SlotPhase::Empty,
      Slot::Loading { .. } => SlotPhase::Loading,
      Slot::Ready(_) => SlotPhase::Ready,
    }
  }

  fn item(&self) -> Option<&Item> {
    match self {
      Slot::Empty => None,
      Slot::Loading { item, .. } => Some(item),
      Slot::Ready(media) => Some(&media.item),
    }
  }
}

/// Outcome of a spawned load, delivered back to the pipeline's owner.
pub struct LoadFinished {
  pub ticket: u64,
  pub item_id: String,
  pub result: Result<Box<dyn MediaHandle>, MediaError>,
}

impl std::fmt::Debug for LoadFinished {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoadFinished")
      .field("ticket", &self.ticket)
      .field("item_id", &self.item_id)
      .field("ok", &self.result.is_ok())
      .finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRequest {
  /// A new load was spawned
  Started,
  /// A load is already running for the standby slot
  InFlight,
  /// Standby already holds a ready item
  AlreadyReady,
}

#[derive(Debug)]
pub enum LoadCompletion {
  /// Standby is now ready with this item
  Ready(Item),
  /// The load failed; standby is empty again
  Failed { item: Item, error: MediaError },
  /// The result belonged to an abandoned load and was released
  Discarded,
}

pub struct PrefetchPipeline {
  slots: [Slot; 2],
  active: usize,
  next_ticket: u64,
  loader: Arc<dyn MediaLoader>,
  events: mpsc::Sender<LoadFinished>,
}

impl PrefetchPipeline {
  pub fn new(loader: Arc<dyn MediaLoader>, events: mpsc::Sender<LoadFinished>) -> Self {
    Self {
      slots: [Slot::Empty, Slot::Empty],
      active: 0,
      next_ticket: 0,
      loader,
      events,
    }
  }

  fn standby(&self) -> usize {
    1 - self.active
  }

  pub fn state(&self) -> PipelineState {
    let standby = self.slots[self.standby()].phase();
    match self.slots[self.active].phase() {
      SlotPhase::Ready => PipelineState::Playing(standby),
      _ if standby == SlotPhase::Empty => PipelineState::Idle,
      _ => PipelineState::Priming(standby),
    }
  }

  pub fn active_item(&self) -> Option<&Item> {
    self.slots[self.active].item()
  }

  /// The item loading or loaded in standby.
  pub fn standby_item(&self) -> Option<&Item> {
    self.slots[self.standby()].item()
  }

  pub fn standby_phase(&self) -> SlotPhase {
    self.slots[self.standby()].phase()
  }

  /// Handles currently held. Never more than two.
  pub fn resident_handles(&self) -> usize {
    self.slots.iter().filter(|slot| matches!(slot, Slot::Ready(_))).count()
  }

  /// Start loading `item` into the standby slot.
  pub fn request_load(&mut self, item: Item) -> LoadRequest {
    self.request_load_after(item, Duration::ZERO)
  }

  /// Like [`request_load`](Self::request_load), waiting `delay` before the
  /// loader is called. Used for retries.
  pub fn request_load_after(&mut self, item: Item, delay: Duration) -> LoadRequest {
    let standby = self.standby();
    match &self.slots[standby] {
      Slot::Loading { item: loading, .. } => {
        trace!(requested = %item.id, loading = %loading.id, "Standby load already in flight");
        return LoadRequest::InFlight;
      }
      Slot::Ready(media) => {
        trace!(requested = %item.id, ready = %media.item.id, "Standby already ready");
        return LoadRequest::AlreadyReady;
      }
      Slot::Empty => {}
    }

    let ticket = self.next_ticket;
    self.next_ticket += 1;

    let loader = Arc::clone(&self.loader);
    let events = self.events.clone();
    let item_id = item.id.clone();
    let media_ref = item.media_ref.clone();
    tokio::spawn(async move {
      if !delay.is_zero() {
        tokio::time::sleep(delay).await;
      }
      let result = loader.load(&media_ref).await;
      // A closed channel means the owner is gone; dropping the handle releases it
      let _ = events.send(LoadFinished { ticket, item_id, result }).await;
    });

    debug!(item_id = %item.id, ticket, delay_ms = delay.as_millis() as u64, "Standby load started");
    self.slots[standby] = Slot::Loading { item, ticket };
    LoadRequest::Started
  }

  /// Apply a finished load. Stale results (slot torn down, or reloaded for a
  /// different ticket) are dropped, which releases their handle.
  pub fn complete_load(&mut self, finished: LoadFinished) -> LoadCompletion {
    let standby = self.standby();
    let item = match std::mem::replace(&mut self.slots[standby], Slot::Empty) {
      Slot::Loading { item, ticket } if ticket == finished.ticket && item.id == finished.item_id => item,
      other => {
        self.slots[standby] = other;
        debug!(item_id = %finished.item_id, ticket = finished.ticket, "Discarding stale load result");
        return LoadCompletion::Discarded;
      }
    };

    match finished.result {
      Ok(mut handle) => {
        handle.set_looping(true);
        handle.pause();
        handle.seek(Duration::ZERO);
        handle.set_volume(MUTED);
        debug!(item_id = %item.id, "Standby ready");
        self.slots[standby] = Slot::Ready(LoadedMedia {
          item: item.clone(),
          handle,
        });
        LoadCompletion::Ready(item)
      }
      Err(error) => {
        warn!(item_id = %item.id, error = %error, "Standby load failed");
        LoadCompletion::Failed { item, error }
      }
    }
  }

  /// Promote standby to active. The former active handle is released before
  /// this returns and its slot becomes the new, empty standby.
  pub fn swap(&mut self, autoplay: bool) -> Result<Item, PipelineError> {
    let standby = self.standby();
    let mut media = match std::mem::replace(&mut self.slots[standby], Slot::Empty) {
      Slot::Ready(media) => media,
      other => {
        self.slots[standby] = other;
        return Err(PipelineError::StandbyNotReady);
      }
    };

    media.handle.seek(Duration::ZERO);
    media.handle.set_volume(AUDIBLE);
    if autoplay {
      media.handle.play();
    }
    let promoted = media.item.clone();

    let released = std::mem::replace(&mut self.slots[self.active], Slot::Empty);
    self.slots[standby] = Slot::Ready(media);
    self.active = standby;
    drop(released);

    debug!(item_id = %promoted.id, autoplay, "Swapped standby to active");
    Ok(promoted)
  }

  /// Release both slots. In-flight loads finish on their own and are discarded.
  pub fn teardown(&mut self) {
    let had = self.resident_handles();
    self.slots = [Slot::Empty, Slot::Empty];
    debug!(released = had, "Pipeline torn down");
  }

  pub fn pause_active(&mut self) {
    if let Slot::Ready(media) = &mut self.slots[self.active] {
      media.handle.pause();
    }
  }

  pub fn play_active(&mut self) {
    if let Slot::Ready(media) = &mut self.slots[self.active] {
      media.handle.play();
    }
  }
}

impl std::fmt::Debug for PrefetchPipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PrefetchPipeline")
      .field("active", &self.slots[self.active])
      .field("standby", &self.slots[self.standby()])
      .finish()
  }
}
