use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive] // Allows adding more variants later without breaking change
pub enum ChatError {
  // --- Routing Errors ---
  #[error("Recipient not found: {0}")]
  RecipientNotFound(String), // Addressed delivery to an id with no live mailbox

  // --- Backpressure ---
  #[error("Inbound queue is full")]
  QueueFull, // Reject policy only; Block policy waits instead

  /// Mailbox-full drop during delivery. Never returned by `submit`; it is
  /// reported through `BrokerEvent::DeliveryDropped` and the drop counters.
  #[error("Delivery to {0} dropped: mailbox full")]
  DeliveryDropped(String),

  // --- Lifecycle ---
  #[error("Broker is closed")]
  BrokerClosed,
  #[error("Operation is invalid for the current broker state: {0}")]
  InvalidState(&'static str),
  #[error("Operation cancelled")]
  Cancelled,

  // --- Validation ---
  #[error("Invalid message: {0}")]
  InvalidMessage(String),
  #[error("Invalid argument provided: {0}")]
  InvalidArgument(String),
  #[error("Invalid user: {0}")]
  InvalidUser(String),
  #[error("User not found: {0}")]
  UserNotFound(String),

  // --- Internal Errors ---
  #[error("Internal library error: {0}")]
  Internal(String),
}

impl ChatError {
  /// True for errors that mean the broker will never accept work again.
  pub fn is_terminal(&self) -> bool {
    matches!(self, ChatError::BrokerClosed | ChatError::Cancelled)
  }
}
