//! Feed simulation: advance through a candidate file like a viewer would

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use swipefeed::{
  AdvanceController, AdvanceOutcome, ControllerHandle, FeedStatus,
  config::Config,
  dirs,
  feed::JsonFileSource,
  filter::{FilePersistence, FilterPersistence, MemoryPersistence},
  media::SlotPhase,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::simulate::SimulatedLoader;

pub struct PlayOptions {
  pub candidates: PathBuf,
  pub steps: usize,
  pub autoplay: bool,
  pub load_ms: u64,
  pub dwell_ms: u64,
  pub fail_every: Option<u64>,
  pub filter_path: Option<PathBuf>,
  pub ephemeral: bool,
  pub json: bool,
}

/// Whether an advance right now can make progress.
fn can_advance(status: &FeedStatus) -> bool {
  if !status.filter_loaded {
    return false;
  }
  if status.standby_phase == SlotPhase::Ready || status.caught_up {
    return true;
  }
  // Last queued item on screen with nothing coming: advancing drains the feed
  let only_active_left = status.active.is_some() && status.queue_len <= 1;
  // Nothing queued and no fetch running: advancing re-triggers the fetch
  let idle_empty = status.queue_len == 0;
  (only_active_left || idle_empty) && !status.refilling
}

/// Run the feed controller over a JSON candidate file with simulated media.
pub async fn cmd_play(config: &Config, opts: PlayOptions) -> Result<()> {
  if !opts.candidates.exists() {
    anyhow::bail!("Candidate file not found: {}", opts.candidates.display());
  }

  let persistence: Arc<dyn FilterPersistence> = if opts.ephemeral {
    Arc::new(MemoryPersistence::new())
  } else {
    let path = opts.filter_path.clone().unwrap_or_else(dirs::default_filter_path);
    debug!(path = %path.display(), "Using seen-filter file");
    Arc::new(FilePersistence::new(path))
  };
  let source = Arc::new(JsonFileSource::new(&opts.candidates));
  let loader = Arc::new(SimulatedLoader::new(Duration::from_millis(opts.load_ms), opts.fail_every));
  let cancel = CancellationToken::new();

  let (handle, filter) = AdvanceController::start(config, persistence, source, loader, cancel.clone())
    .context("Invalid seen-filter configuration")?;

  let ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      ctrl_c.cancel();
    }
  });

  let poll = Duration::from_millis(config.pipeline.readiness_poll_ms);
  let shown = drive(&handle, &cancel, &opts, poll).await;

  if let Err(e) = handle.shutdown().await {
    // Already stopped by Ctrl-C; it flushed on the way out
    debug!(error = %e, "Controller already stopped");
  }
  let shown = shown?;

  let stats = filter.stats();
  if opts.json {
    let summary = serde_json::json!({ "shown": shown, "filter": stats });
    println!("{}", serde_json::to_string_pretty(&summary)?);
  } else {
    println!();
    println!("Shown:          {}", shown);
    println!("Filter bits:    {} / {} set", stats.bits_used, stats.size);
    println!("Est. FP rate:   {:.4}%", stats.estimated_fpp * 100.0);
  }

  Ok(())
}

async fn drive(
  handle: &ControllerHandle,
  cancel: &CancellationToken,
  opts: &PlayOptions,
  poll: Duration,
) -> Result<usize> {
  let mut shown = 0;

  while shown < opts.steps {
    let ready = tokio::select! {
      _ = cancel.cancelled() => break,
      status = handle.wait_for(can_advance) => status,
    };
    ready.context("Controller stopped unexpectedly")?;

    match handle.advance(opts.autoplay).await.context("Controller stopped unexpectedly")? {
      AdvanceOutcome::Advanced { now_playing } => {
        shown += 1;
        if !opts.json {
          println!(
            "[{:>3}] {}  @{}  {}",
            shown, now_playing.id, now_playing.creator, now_playing.description
          );
        }
        if opts.dwell_ms > 0 {
          tokio::time::sleep(Duration::from_millis(opts.dwell_ms)).await;
        }
      }
      AdvanceOutcome::Pending => {
        tokio::time::sleep(poll).await;
      }
      AdvanceOutcome::Drained => {
        if !opts.json {
          println!("      (queue drained, fetching more)");
        }
      }
      AdvanceOutcome::CaughtUp => {
        if !opts.json {
          println!("      You're all caught up.");
        }
        break;
      }
    }
  }

  if cancel.is_cancelled() {
    warn!("Interrupted");
  }
  Ok(shown)
}
