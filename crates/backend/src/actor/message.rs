//! Message types for the feed controller actor

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{
  domain::item::Item,
  feed::{FeedPage, FetchError},
  media::SlotPhase,
};

/// Requests accepted by the controller.
#[derive(Debug)]
pub enum ControllerMessage {
  /// Consume the current item and show the next one
  Advance {
    autoplay: bool,
    reply: oneshot::Sender<AdvanceOutcome>,
  },
  /// Fresh status snapshot
  Status { reply: oneshot::Sender<FeedStatus> },
  /// Leave the caught-up state and re-read the newest candidates
  Refresh,
  /// Pause or resume the on-screen item
  SetPlaying { playing: bool },
  /// Stop the controller, flushing the seen-filter first
  Shutdown { reply: oneshot::Sender<()> },
}

/// Result of an `advance` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
  /// The standby item is now on screen
  Advanced { now_playing: Item },
  /// The next item is not ready yet; nothing changed
  Pending,
  /// The current item was consumed and nothing is queued behind it; a refill is running
  Drained,
  /// Every available candidate has been seen
  CaughtUp,
}

/// Snapshot of the controller's observable state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FeedStatus {
  pub filter_loaded: bool,
  pub queue_len: usize,
  pub active: Option<String>,
  pub standby: Option<String>,
  pub standby_phase: SlotPhase,
  pub refilling: bool,
  /// Nothing queued and the source has no unseen candidates
  pub caught_up: bool,
}

/// Result of a spawned fetch, routed back into the actor.
#[derive(Debug)]
pub(crate) struct RefillResult {
  pub result: Result<FeedPage, FetchError>,
}
