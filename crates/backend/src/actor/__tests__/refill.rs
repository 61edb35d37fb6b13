//! Refill E2E tests: low-water mark, single-flight fetches, paging past seen
//! pages, the caught-up state and refresh.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crate::{
    actor::{
      __tests__::helpers::{FeedHarness, ScriptedLoader, ScriptedSource, eventually, items, test_config},
      message::AdvanceOutcome,
    },
    domain::config::Config,
    filter::{MemoryPersistence, SeenFilter},
  };

  fn paged_config(fetch_limit: usize) -> Config {
    let mut config = test_config();
    config.feed.fetch_limit = fetch_limit;
    config
  }

  /// Saved filter bytes in which `ids` are already seen.
  fn seen(ids: &[&str]) -> MemoryPersistence {
    let config = test_config();
    let mut filter = SeenFilter::new(config.filter.size, config.filter.hash_count).unwrap();
    for id in ids {
      filter.add(id);
    }
    MemoryPersistence::with_bytes(filter.serialize())
  }

  // ==========================================================================
  // Low-water mark and single flight
  // ==========================================================================

  #[tokio::test]
  async fn test_refill_is_single_flight() {
    let source = ScriptedSource::new(items(&["i0", "i1", "i2", "i3", "i4", "i5", "i6", "i7"]));
    source.hold();
    let harness = FeedHarness::start_with(paged_config(4), source, ScriptedLoader::new(), MemoryPersistence::new());

    assert!(eventually(|| harness.source.calls() == 1).await);
    let status = harness.wait_for(|s| s.filter_loaded).await;
    assert!(status.refilling);

    // Every trigger while the fetch is outstanding is absorbed
    for _ in 0..3 {
      assert_eq!(harness.handle.advance(true).await.unwrap(), AdvanceOutcome::Pending);
      harness.handle.refresh().await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.source.calls(), 1);

    harness.source.release(1);
    let status = harness.wait_for(|s| s.queue_len == 4 && !s.refilling).await;
    assert!(!status.caught_up);
  }

  #[tokio::test]
  async fn test_refill_triggers_below_low_water_mark() {
    let source = ScriptedSource::new(items(&["i0", "i1", "i2", "i3", "i4", "i5", "i6", "i7"]));
    source.hold();
    source.release(1);
    let harness = FeedHarness::start_with(paged_config(4), source, ScriptedLoader::new(), MemoryPersistence::new());

    harness.wait_for(|s| s.queue_len == 4 && !s.refilling).await;

    // Queue 4 -> 3 (i0 consumed): still at the mark, no fetch
    assert_eq!(harness.advance_to_next().await, "i0");
    assert_eq!(harness.advance_to_next().await, "i1");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.source.calls(), 1);

    // Queue 3 -> 2: below the mark, next page requested with the saved cursor
    assert_eq!(harness.advance_to_next().await, "i2");
    assert!(eventually(|| harness.source.calls() == 2).await);
    assert_eq!(harness.source.cursors(), vec![None, Some("4".to_string())]);

    harness.source.release(1);
    let status = harness.wait_for(|s| s.queue_len == 6 && !s.refilling).await;
    assert_eq!(status.active.as_deref(), Some("i2"));
  }

  #[tokio::test]
  async fn test_failed_refill_is_retried_on_next_trigger() {
    let source = ScriptedSource::new(items(&["a", "b", "c"]));
    source.fail_times(1);
    let harness = FeedHarness::start(source);

    assert!(eventually(|| harness.source.calls() == 1).await);
    let status = harness.wait_for(|s| s.filter_loaded && !s.refilling).await;
    assert_eq!(status.queue_len, 0);
    assert!(!status.caught_up, "a failed fetch is not the end of the feed");

    assert_eq!(harness.handle.advance(true).await.unwrap(), AdvanceOutcome::Pending);
    assert_eq!(harness.advance_to_next().await, "a");
    assert_eq!(harness.source.calls(), 2);
  }

  // ==========================================================================
  // Paging and caught-up
  // ==========================================================================

  #[tokio::test]
  async fn test_fully_seen_page_reads_next_page() {
    let harness = FeedHarness::start_with(
      paged_config(3),
      ScriptedSource::new(items(&["a", "b", "c", "d", "e", "f"])),
      ScriptedLoader::new(),
      seen(&["a", "b", "c"]),
    );

    assert_eq!(harness.advance_to_next().await, "d");
    assert_eq!(harness.source.cursors()[..2], [None, Some("3".to_string())]);
  }

  #[tokio::test]
  async fn test_all_seen_reports_caught_up() {
    let harness = FeedHarness::start_with(
      test_config(),
      ScriptedSource::new(items(&["a", "b", "c"])),
      ScriptedLoader::new(),
      seen(&["a", "b", "c"]),
    );

    let status = harness.wait_for(|s| s.caught_up).await;
    assert_eq!(status.queue_len, 0);
    assert_eq!(harness.handle.advance(true).await.unwrap(), AdvanceOutcome::CaughtUp);

    // Caught up stays quiet until asked to refresh
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.source.calls(), 1);
    assert_eq!(harness.loader.calls(), 0);
  }

  #[tokio::test]
  async fn test_refresh_picks_up_new_items() {
    let harness = FeedHarness::start_with(
      test_config(),
      ScriptedSource::new(items(&["a", "b"])),
      ScriptedLoader::new(),
      seen(&["a", "b"]),
    );
    harness.wait_for(|s| s.caught_up).await;

    harness.source.publish(items(&["new"]));
    harness.handle.refresh().await.unwrap();

    assert_eq!(harness.advance_to_next().await, "new");
    assert_eq!(harness.source.cursors().last(), Some(&None));
  }

  #[tokio::test]
  async fn test_seen_and_duplicate_candidates_never_queued() {
    let harness = FeedHarness::start_with(
      test_config(),
      ScriptedSource::new(items(&["1", "2", "3", "4", "5"])),
      ScriptedLoader::new(),
      seen(&["2", "4"]),
    );

    let mut shown = Vec::new();
    for _ in 0..3 {
      shown.push(harness.advance_to_next().await);
    }
    assert_eq!(shown, vec!["1", "3", "5"]);

    // Consuming the last one leaves nothing: every candidate has been seen
    let outcome = harness.handle.advance(true).await.unwrap();
    assert!(matches!(outcome, AdvanceOutcome::Drained | AdvanceOutcome::CaughtUp));
    harness.wait_for(|s| s.caught_up).await;
  }
}
