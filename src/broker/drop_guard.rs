use crate::broker::core::BrokerInner;

use std::sync::Arc;

/// Finalizes the broker if the `run` future is dropped before the loop
/// returns (task aborted, enclosing `select!` took another branch, ...).
///
/// Without it, mailboxes would stay open and `shutdown` callers would wait
/// forever on a dispatcher that no longer exists.
pub(crate) struct DispatcherDropGuard {
  inner: Arc<BrokerInner>,
  finished: bool,
}

impl DispatcherDropGuard {
  pub fn new(inner: Arc<BrokerInner>) -> Self {
    Self { inner, finished: false }
  }

  /// Marks a normal exit; the caller finalizes the broker itself.
  pub fn waive(mut self) {
    self.finished = true;
  }
}

impl Drop for DispatcherDropGuard {
  fn drop(&mut self) {
    if !self.finished {
      tracing::debug!("Dispatcher dropped mid-loop, finalizing broker");
      self.inner.finalize();
    }
  }
}
