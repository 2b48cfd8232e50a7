use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// A one-way latch released when the broker reaches `Stopped`.
///
/// Any number of tasks may wait on it; once released it stays released and
/// later waiters return immediately.
#[derive(Debug, Default)]
pub(crate) struct StopLatch {
  released: AtomicBool,
  notify: Notify,
}

impl StopLatch {
  pub fn new() -> Self {
    Self::default()
  }

  /// Releases every current and future waiter. Idempotent.
  pub fn release(&self) {
    if !self.released.swap(true, Ordering::AcqRel) {
      self.notify.notify_waiters();
    }
  }

  pub fn is_released(&self) -> bool {
    self.released.load(Ordering::Acquire)
  }

  /// Waits until `release` has been called.
  pub async fn wait(&self) {
    loop {
      // Register interest before checking the flag so a release between the
      // check and the await is not missed.
      let notified = self.notify.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();
      if self.is_released() {
        return;
      }
      notified.await;
    }
  }
}
