use std::collections::VecDeque;

use hashbrown::HashSet;

/// A deduplicating queue that can grow while it is being drained.
///
/// The queue is done once every enqueued item has been completed, which tolerates items being
/// added by work that is still in flight.
pub struct WorkQueue<T> {
  pending: VecDeque<T>,
  seen: HashSet<String>,
  enqueued: usize,
  completed: usize,
}

impl<T> Default for WorkQueue<T> {
  fn default() -> Self {
    Self {
      pending: VecDeque::new(),
      seen: HashSet::new(),
      enqueued: 0,
      completed: 0,
    }
  }
}

impl<T> WorkQueue<T> {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds `item` unless `key` was enqueued before. Returns whether it was added.
  pub fn enqueue(&mut self, key: &str, item: T) -> bool {
    if !self.seen.insert(key.to_string()) {
      return false;
    }
    self.pending.push_back(item);
    self.enqueued += 1;
    true
  }

  /// Takes the next item to start. `None` does not mean done: in-flight items may add more.
  pub fn next(&mut self) -> Option<T> {
    self.pending.pop_front()
  }

  pub fn complete(&mut self) {
    debug_assert!(self.completed < self.enqueued);
    self.completed += 1;
  }

  #[must_use]
  pub fn in_flight(&self) -> usize {
    self.enqueued - self.completed - self.pending.len()
  }

  #[must_use]
  pub fn is_done(&self) -> bool {
    self.completed == self.enqueued
  }
}
