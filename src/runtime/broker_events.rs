use crate::broker::state::BrokerState;

/// Observability events published by a broker on its `EventBus`.
///
/// Delivery problems that happen after `submit` already returned `Ok` are
/// only ever reported here and in the broker stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
  /// A mailbox was installed for `user_id`.
  UserRegistered {
    user_id: String,
    capacity: usize,
    /// True if a previous mailbox for the same id was closed and replaced.
    replaced: bool,
  },

  /// The mailbox for `user_id` was closed and removed from the registry.
  UserUnregistered {
    user_id: String,
    /// Messages that were still queued and got discarded.
    discarded: usize,
  },

  /// A delivery was dropped because the recipient's mailbox was full.
  DeliveryDropped {
    user_id: String,
    sender: String,
    broadcast: bool,
    /// Running total of drops for this mailbox, including this one.
    total_dropped: u64,
  },

  /// A direct message was accepted but its recipient was gone by the time
  /// the dispatcher processed it.
  Undeliverable { recipient: String, sender: String },

  /// The broker moved to a later lifecycle state.
  StateChanged { from: BrokerState, to: BrokerState },
}
