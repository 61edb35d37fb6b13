//! Actor that drives the feed
//!
//! The feed queue and the playback slots are owned by a single long-lived
//! task, [`AdvanceController`]. Callers talk to it through a cloneable
//! [`ControllerHandle`]; requests are applied one at a time in mailbox order,
//! so two concurrent advances can never interleave.
//!
//! # Event sources
//!
//! The controller loop selects over, in priority order:
//!
//! - cancellation
//! - the seen-filter finishing its initial load
//! - standby loads finishing
//! - candidate fetches finishing
//! - caller requests
//!
//! ```text
//! handle ──▶ mailbox ──▶ AdvanceController ──▶ FeedSource   (spawned fetch)
//!                              │          └──▶ MediaLoader  (spawned load)
//!                              ▼
//!                        watch<FeedStatus>
//! ```
//!
//! See [`message`] for the request and status types.

pub mod controller;
pub mod handle;
pub mod message;


pub use controller::AdvanceController;
pub use handle::{ControllerError, ControllerHandle};
pub use message::{AdvanceOutcome, FeedStatus};
