// src/runtime/event_bus.rs

use super::broker_events::BrokerEvent;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Default number of events buffered per subscriber before it starts lagging.
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 256;

/// Receiving end of an event bus subscription.
pub type EventReceiver = Receiver<BrokerEvent>;

/// Fan-out channel for [`BrokerEvent`]s.
///
/// Emitting never waits: a subscriber that falls more than the capacity
/// behind gets `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
  sender: Sender<BrokerEvent>,
}

impl EventBus {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_EVENT_BUS_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    let (sender, _) = broadcast::channel(capacity);
    tracing::debug!(capacity, "Created broker event bus");
    Self { sender }
  }

  /// Sends `event` to every current subscriber. Having none is normal.
  pub(crate) fn emit(&self, event: BrokerEvent) {
    if self.sender.receiver_count() == 0 {
      return;
    }
    tracing::trace!(event = ?event, "Emitting broker event");
    let _ = self.sender.send(event);
  }

  /// Subscribes to events emitted from now on.
  pub fn subscribe(&self) -> EventReceiver {
    self.sender.subscribe()
  }
}

impl Default for EventBus {
  fn default() -> Self {
    Self::new()
  }
}
