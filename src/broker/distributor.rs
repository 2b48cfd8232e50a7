use crate::broker::options::MailboxPolicy;
use crate::message::Message;
use crate::runtime::{DeliveryOutcome, MailboxHandle};

use futures::stream::{self, StreamExt};

/// Fans one broadcast out to a registry snapshot.
///
/// At most `concurrency` deliveries are in flight at once. With the `Drop`
/// policy every delivery completes immediately; with `BlockWithTimeout` the
/// bound keeps one slow consumer from serializing the whole fan-out while
/// still capping the number of pending sends.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Distributor {
  policy: MailboxPolicy,
  concurrency: usize,
}

impl Distributor {
  pub fn new(policy: MailboxPolicy, concurrency: usize) -> Self {
    Self {
      policy,
      concurrency: concurrency.max(1),
    }
  }

  /// Delivers `msg` to every target independently. A failed delivery never
  /// stops the others. Results come back in target order, one per target.
  pub async fn send_to_all(
    &self,
    msg: &Message,
    targets: Vec<(String, MailboxHandle)>,
  ) -> Vec<(String, MailboxHandle, DeliveryOutcome)> {
    tracing::trace!(
      num_targets = targets.len(),
      sender = %msg.sender(),
      "Distributor::send_to_all: distributing broadcast"
    );
    if targets.is_empty() {
      return Vec::new();
    }

    let policy = self.policy;
    stream::iter(targets)
      .map(|(user_id, handle)| {
        let msg = msg.clone(); // Content is shared, this only bumps refcounts
        async move {
          let outcome = handle.deliver(msg, policy).await;
          (user_id, handle, outcome)
        }
      })
      .buffered(self.concurrency)
      .collect()
      .await
  }
}
