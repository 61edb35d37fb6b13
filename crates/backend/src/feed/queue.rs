use std::{
  collections::{HashSet, VecDeque},
  sync::Arc,
};

use tracing::{debug, trace};

use crate::{domain::item::Item, filter::FilterStore};

/// Result of appending a batch of candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefillOutcome {
  /// Candidates offered by the batch
  pub offered: usize,
  /// Candidates actually appended
  pub appended: usize,
  /// A non-empty batch was filtered out entirely ("all caught up")
  pub exhausted: bool,
}

/// FIFO of items not yet shown.
///
/// Candidates already in the seen-filter are dropped on insertion, as are
/// ids already queued, so no two entries ever share an id. The front entry is
/// the item on screen; the second is the one being primed behind it.
#[derive(Debug)]
pub struct FeedQueue {
  items: VecDeque<Item>,
  ids: HashSet<String>,
  filter: Arc<FilterStore>,
  low_water_mark: usize,
  refill_in_flight: bool,
}

impl FeedQueue {
  pub fn new(filter: Arc<FilterStore>, low_water_mark: usize) -> Self {
    Self {
      items: VecDeque::new(),
      ids: HashSet::new(),
      filter,
      low_water_mark,
      refill_in_flight: false,
    }
  }

  /// Append the unseen, not-yet-queued candidates, preserving their order.
  pub fn refill(&mut self, candidates: Vec<Item>) -> RefillOutcome {
    let offered = candidates.len();
    let mut appended = 0;

    for item in candidates {
      if self.ids.contains(&item.id) {
        trace!(item_id = %item.id, "Candidate already queued");
        continue;
      }
      if self.filter.might_contain(&item.id) {
        trace!(item_id = %item.id, "Candidate already seen");
        continue;
      }
      self.ids.insert(item.id.clone());
      self.items.push_back(item);
      appended += 1;
    }

    let outcome = RefillOutcome {
      offered,
      appended,
      exhausted: offered > 0 && appended == 0,
    };
    debug!(
      offered,
      appended,
      queue_len = self.items.len(),
      exhausted = outcome.exhausted,
      "Queue refilled"
    );
    outcome
  }

  pub fn pop_front(&mut self) -> Option<Item> {
    let item = self.items.pop_front()?;
    self.ids.remove(&item.id);
    Some(item)
  }

  pub fn peek_front(&self) -> Option<&Item> {
    self.items.front()
  }

  pub fn peek_second(&self) -> Option<&Item> {
    self.items.get(1)
  }

  /// Drop a queued item wherever it sits.
  pub fn remove(&mut self, id: &str) -> Option<Item> {
    let index = self.items.iter().position(|item| item.id == id)?;
    let item = self.items.remove(index)?;
    self.ids.remove(&item.id);
    Some(item)
  }

  pub fn contains(&self, id: &str) -> bool {
    self.ids.contains(id)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn ids(&self) -> impl Iterator<Item = &str> {
    self.items.iter().map(|item| item.id.as_str())
  }

  /// Below the low-water mark.
  pub fn needs_refill(&self) -> bool {
    self.items.len() < self.low_water_mark
  }

  /// Claim the single refill slot. Returns false if a refill is already running.
  pub fn try_begin_refill(&mut self) -> bool {
    if self.refill_in_flight {
      return false;
    }
    self.refill_in_flight = true;
    true
  }

  pub fn finish_refill(&mut self) {
    self.refill_in_flight = false;
  }

  pub fn is_refilling(&self) -> bool {
    self.refill_in_flight
  }
}
