use crate::broker::core::BrokerInner;
use crate::broker::distributor::Distributor;
use crate::message::{Message, Route};
use crate::runtime::{BrokerEvent, DeliveryOutcome, MailboxHandle};

/// The single serialized loop that routes inbound messages.
///
/// Messages are taken off the inbound queue one at a time and fully routed
/// (including the whole broadcast fan-out) before the next one is looked at,
/// which is what keeps per-recipient order equal to submission order.
pub(crate) struct Dispatcher<'a> {
  inner: &'a BrokerInner,
  distributor: Distributor,
}

impl<'a> Dispatcher<'a> {
  pub fn new(inner: &'a BrokerInner) -> Self {
    let config = inner.config();
    Self {
      inner,
      distributor: Distributor::new(config.full_mailbox_policy, config.fanout_concurrency),
    }
  }

  /// Runs until the cancellation signal fires or the inbound queue is closed
  /// and empty.
  pub async fn run_loop(&self) {
    let inbound = self.inner.inbound_receiver();
    let cancel = self.inner.cancellation_token();
    tracing::debug!("Dispatcher loop started");

    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          tracing::debug!("Dispatcher observed cancellation");
          break;
        }
        received = inbound.recv() => match received {
          Ok(msg) => {
            if self.inner.discarding() {
              self.inner.stats().record_discarded(1);
              continue;
            }
            self.dispatch(msg).await;
          }
          Err(_) => {
            tracing::debug!("Inbound queue closed and drained");
            break;
          }
        }
      }
    }
  }

  /// Routes whatever is left on an already closed inbound queue. Used when
  /// `shutdown` runs on a broker whose loop never started.
  pub async fn drain_closed_queue(&self) {
    let inbound = self.inner.inbound_receiver();
    while let Ok(msg) = inbound.try_recv() {
      self.dispatch(msg).await;
    }
  }

  /// Routes one message. Never fails: per-recipient problems are recorded
  /// in the stats and on the event bus.
  ///
  /// The submit-time stamp is raised to the last one dispatched, so stamps
  /// are non-decreasing in the order recipients observe them.
  pub async fn dispatch(&self, msg: Message) {
    self.inner.stats().record_dispatched();
    let settled = self.inner.dispatch_clock().settle(msg.timestamp());
    let msg = msg.stamped(settled);
    match msg.route() {
      Route::Broadcast => {
        let targets = self.inner.registry().snapshot_all();
        let results = self.distributor.send_to_all(&msg, targets).await;
        for (user_id, handle, outcome) in results {
          self.record(&user_id, &handle, &msg, outcome);
        }
      }
      Route::Direct(recipient) => match self.inner.registry().lookup(recipient) {
        Ok(handle) => {
          let outcome = handle.deliver(msg.clone(), self.inner.config().full_mailbox_policy).await;
          self.record(recipient, &handle, &msg, outcome);
        }
        Err(_) => {
          // Accepted by `submit`, but the recipient left before dispatch.
          tracing::debug!(recipient = %recipient, sender = %msg.sender(), "Recipient gone at dispatch time");
          self.inner.stats().record_undeliverable();
          self.inner.event_bus().emit(BrokerEvent::Undeliverable {
            recipient: recipient.clone(),
            sender: msg.sender().to_string(),
          });
        }
      },
    }
  }

  fn record(&self, user_id: &str, handle: &MailboxHandle, msg: &Message, outcome: DeliveryOutcome) {
    match outcome {
      DeliveryOutcome::Delivered => {
        tracing::trace!(user_id = %user_id, "Message delivered");
        self.inner.stats().record_delivered();
      }
      DeliveryOutcome::Dropped => {
        let total_dropped = handle.dropped();
        tracing::debug!(
          user_id = %user_id,
          sender = %msg.sender(),
          total_dropped,
          "Mailbox full, message dropped"
        );
        self.inner.stats().record_dropped();
        self.inner.event_bus().emit(BrokerEvent::DeliveryDropped {
          user_id: user_id.to_string(),
          sender: msg.sender().to_string(),
          broadcast: msg.is_broadcast(),
          total_dropped,
        });
      }
      DeliveryOutcome::Closed => {
        // Replaced or unregistered between lookup and send.
        tracing::debug!(user_id = %user_id, "Mailbox closed before delivery, skipping");
      }
    }
  }
}
