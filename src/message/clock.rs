use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hands out unix-microsecond timestamps that never go backwards, even if the
/// wall clock does.
#[derive(Debug, Default)]
pub struct StampClock {
  last: AtomicI64,
}

impl StampClock {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns `max(now, previous stamp)`.
  pub fn stamp(&self) -> i64 {
    let now = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_micros() as i64)
      .unwrap_or(0);
    let prev = self.last.fetch_max(now, Ordering::AcqRel);
    prev.max(now)
  }

  /// Raises `ts` to at least the previous stamp and records the result.
  /// Used to keep stamps ordered along a path where `ts` was taken earlier.
  pub fn settle(&self, ts: i64) -> i64 {
    let prev = self.last.fetch_max(ts, Ordering::AcqRel);
    prev.max(ts)
  }

  /// The most recent stamp handed out, `0` if none.
  pub fn last(&self) -> i64 {
    self.last.load(Ordering::Acquire)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stamps_are_non_decreasing() {
    let clock = StampClock::new();
    let mut prev = 0;
    for _ in 0..1_000 {
      let ts = clock.stamp();
      assert!(ts >= prev);
      prev = ts;
    }
    assert_eq!(clock.last(), prev);
  }

  #[test]
  fn stamp_never_goes_below_last() {
    let clock = StampClock::new();
    // Simulate a clock that previously ran ahead of the wall clock.
    let future = i64::MAX / 2;
    clock.last.store(future, Ordering::Release);
    assert_eq!(clock.stamp(), future);
  }

  #[test]
  fn settle_lifts_stale_stamps() {
    let clock = StampClock::new();
    assert_eq!(clock.settle(100), 100);
    assert_eq!(clock.settle(40), 100);
    assert_eq!(clock.settle(250), 250);
    assert_eq!(clock.last(), 250);
  }
}
