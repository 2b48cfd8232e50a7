use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a broker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
  /// Messages accepted by `submit`/`try_submit`.
  pub submitted: u64,
  /// Messages taken off the inbound queue and routed.
  pub dispatched: u64,
  /// Successful mailbox deliveries (a broadcast counts once per recipient).
  pub delivered: u64,
  /// Deliveries dropped because a mailbox was full.
  pub dropped: u64,
  /// Accepted direct messages whose recipient had left by dispatch time.
  pub undeliverable: u64,
  /// Accepted messages discarded unrouted during shutdown or cancellation.
  pub discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
  submitted: AtomicU64,
  dispatched: AtomicU64,
  delivered: AtomicU64,
  dropped: AtomicU64,
  undeliverable: AtomicU64,
  discarded: AtomicU64,
}

impl StatsCounters {
  pub fn record_submitted(&self) {
    self.submitted.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_dispatched(&self) {
    self.dispatched.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_delivered(&self) {
    self.delivered.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_dropped(&self) {
    self.dropped.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_undeliverable(&self) {
    self.undeliverable.fetch_add(1, Ordering::Relaxed);
  }

  pub fn record_discarded(&self, count: u64) {
    if count > 0 {
      self.discarded.fetch_add(count, Ordering::Relaxed);
    }
  }

  pub fn snapshot(&self) -> BrokerStats {
    BrokerStats {
      submitted: self.submitted.load(Ordering::Relaxed),
      dispatched: self.dispatched.load(Ordering::Relaxed),
      delivered: self.delivered.load(Ordering::Relaxed),
      dropped: self.dropped.load(Ordering::Relaxed),
      undeliverable: self.undeliverable.load(Ordering::Relaxed),
      discarded: self.discarded.load(Ordering::Relaxed),
    }
  }
}
