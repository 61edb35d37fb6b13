//! Handle for communicating with the feed controller
//!
//! The handle is cheap to clone and can be shared across tasks. Every request
//! goes through the controller's single mailbox, so concurrent `advance`
//! calls are applied one at a time.

use tokio::sync::{mpsc, oneshot, watch};

use super::message::{AdvanceOutcome, ControllerMessage, FeedStatus};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ControllerError {
  #[error("Controller has shut down")]
  ControllerGone,
}

#[derive(Clone, Debug)]
pub struct ControllerHandle {
  tx: mpsc::Sender<ControllerMessage>,
  status: watch::Receiver<FeedStatus>,
}

impl ControllerHandle {
  pub(crate) fn new(tx: mpsc::Sender<ControllerMessage>, status: watch::Receiver<FeedStatus>) -> Self {
    Self { tx, status }
  }

  async fn send(&self, msg: ControllerMessage) -> Result<(), ControllerError> {
    self.tx.send(msg).await.map_err(|_| ControllerError::ControllerGone)
  }

  /// Consume the current item and move to the next one.
  ///
  /// `autoplay` decides whether the promoted item starts playing immediately.
  pub async fn advance(&self, autoplay: bool) -> Result<AdvanceOutcome, ControllerError> {
    let (reply, rx) = oneshot::channel();
    self.send(ControllerMessage::Advance { autoplay, reply }).await?;
    rx.await.map_err(|_| ControllerError::ControllerGone)
  }

  /// Ask the controller for a fresh snapshot.
  pub async fn status(&self) -> Result<FeedStatus, ControllerError> {
    let (reply, rx) = oneshot::channel();
    self.send(ControllerMessage::Status { reply }).await?;
    rx.await.map_err(|_| ControllerError::ControllerGone)
  }

  /// Watch status snapshots as they are published.
  pub fn subscribe(&self) -> watch::Receiver<FeedStatus> {
    self.status.clone()
  }

  /// Wait until a published status satisfies `predicate`.
  pub async fn wait_for(&self, predicate: impl FnMut(&FeedStatus) -> bool) -> Result<FeedStatus, ControllerError> {
    let mut rx = self.status.clone();
    let status = rx
      .wait_for(predicate)
      .await
      .map_err(|_| ControllerError::ControllerGone)?;
    Ok(status.clone())
  }

  /// Leave the caught-up state and look for new candidates.
  pub async fn refresh(&self) -> Result<(), ControllerError> {
    self.send(ControllerMessage::Refresh).await
  }

  pub async fn pause(&self) -> Result<(), ControllerError> {
    self.send(ControllerMessage::SetPlaying { playing: false }).await
  }

  pub async fn resume(&self) -> Result<(), ControllerError> {
    self.send(ControllerMessage::SetPlaying { playing: true }).await
  }

  /// Stop the controller. Resolves once the seen-filter has been flushed.
  pub async fn shutdown(&self) -> Result<(), ControllerError> {
    let (reply, rx) = oneshot::channel();
    self.send(ControllerMessage::Shutdown { reply }).await?;
    rx.await.map_err(|_| ControllerError::ControllerGone)
  }
}
