//! Simulated media layer for driving the feed without a real player

use std::{
  sync::atomic::{AtomicU64, Ordering},
  time::Duration,
};

use async_trait::async_trait;
use swipefeed::media::{MediaError, MediaHandle, MediaLoader};
use tracing::trace;

/// Loader that "downloads" for a fixed delay.
///
/// Refs starting with `missing://` fail with [`MediaError::NotFound`]; every
/// `fail_every`-th load fails with a network error.
pub struct SimulatedLoader {
  delay: Duration,
  fail_every: Option<u64>,
  loads: AtomicU64,
}

impl SimulatedLoader {
  pub fn new(delay: Duration, fail_every: Option<u64>) -> Self {
    Self {
      delay,
      fail_every: fail_every.filter(|n| *n > 0),
      loads: AtomicU64::new(0),
    }
  }
}

#[async_trait]
impl MediaLoader for SimulatedLoader {
  async fn load(&self, media_ref: &str) -> Result<Box<dyn MediaHandle>, MediaError> {
    let n = self.loads.fetch_add(1, Ordering::Relaxed) + 1;
    tokio::time::sleep(self.delay).await;

    if media_ref.starts_with("missing://") {
      return Err(MediaError::NotFound(media_ref.to_string()));
    }
    if let Some(every) = self.fail_every
      && n % every == 0
    {
      return Err(MediaError::Network(format!("simulated drop on load #{n}")));
    }

    Ok(Box::new(SimulatedHandle::new(media_ref)))
  }
}

#[derive(Debug)]
struct SimulatedHandle {
  media_ref: String,
  position: Duration,
  volume: f32,
  playing: bool,
  looping: bool,
}

impl SimulatedHandle {
  fn new(media_ref: &str) -> Self {
    Self {
      media_ref: media_ref.to_string(),
      position: Duration::ZERO,
      volume: 1.0,
      playing: false,
      looping: false,
    }
  }
}

impl MediaHandle for SimulatedHandle {
  fn seek(&mut self, position: Duration) {
    self.position = position;
  }

  fn play(&mut self) {
    self.playing = true;
    trace!(media_ref = %self.media_ref, volume = self.volume, looping = self.looping, "play");
  }

  fn pause(&mut self) {
    self.playing = false;
  }

  fn set_volume(&mut self, volume: f32) {
    self.volume = volume.clamp(0.0, 1.0);
  }

  fn set_looping(&mut self, looping: bool) {
    self.looping = looping;
  }
}

impl Drop for SimulatedHandle {
  fn drop(&mut self) {
    trace!(media_ref = %self.media_ref, at = ?self.position, "released");
  }
}
