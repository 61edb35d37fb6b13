//! Media collaborator and the double-buffered prefetch pipeline
//!
//! The asset/network layer is abstracted behind [`MediaLoader`], which turns a
//! `media_ref` into a playable [`MediaHandle`]. Dropping a handle releases its
//! decoder and network resources.

mod pipeline;
mod retry;

use std::time::Duration;

use async_trait::async_trait;

pub use pipeline::{
  LoadCompletion, LoadFinished, LoadRequest, LoadedMedia, PipelineError, PipelineState, PrefetchPipeline, SlotPhase,
};
pub use retry::LoadRetryPolicy;

/// A loaded, playable media resource.
pub trait MediaHandle: Send {
  fn seek(&mut self, position: Duration);
  fn play(&mut self);
  fn pause(&mut self);
  /// 0.0 is muted, 1.0 is full volume
  fn set_volume(&mut self, volume: f32);
  /// When set, playback seeks to the start and continues on reaching the end
  fn set_looping(&mut self, looping: bool);
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MediaError {
  #[error("Media not found: {0}")]
  NotFound(String),
  #[error("Failed to decode media: {0}")]
  Decode(String),
  #[error("Network error: {0}")]
  Network(String),
}

/// The asset/network layer that materializes playable handles.
#[async_trait]
pub trait MediaLoader: Send + Sync {
  async fn load(&self, media_ref: &str) -> Result<Box<dyn MediaHandle>, MediaError>;
}
