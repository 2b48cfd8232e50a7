use crate::error::ChatError;

use std::fmt;
use std::sync::Arc;

/// Where a message is headed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
  /// Addressed to a single user id.
  Direct(String),
  /// Fanned out to every user registered when the dispatcher processes it.
  Broadcast,
}

/// An immutable chat message envelope.
///
/// The content is reference counted so the copies made during broadcast
/// fan-out share one allocation. The timestamp is zero until the broker
/// accepts the message in `submit`; after acceptance no field changes.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
  sender: Arc<str>,
  route: Route,
  content: Arc<str>,
  timestamp: i64,
}

impl Message {
  /// Creates a message addressed to one recipient.
  pub fn direct(sender: impl Into<String>, recipient: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      sender: Arc::from(sender.into()),
      route: Route::Direct(recipient.into()),
      content: Arc::from(content.into()),
      timestamp: 0,
    }
  }

  /// Creates a message for every registered user, the sender included.
  pub fn broadcast(sender: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      sender: Arc::from(sender.into()),
      route: Route::Broadcast,
      content: Arc::from(content.into()),
      timestamp: 0,
    }
  }

  pub fn sender(&self) -> &str {
    &self.sender
  }

  /// The addressed recipient, or `None` for broadcasts.
  pub fn recipient(&self) -> Option<&str> {
    match &self.route {
      Route::Direct(recipient) => Some(recipient),
      Route::Broadcast => None,
    }
  }

  pub fn route(&self) -> &Route {
    &self.route
  }

  pub fn is_broadcast(&self) -> bool {
    matches!(self.route, Route::Broadcast)
  }

  pub fn content(&self) -> &str {
    &self.content
  }

  /// Unix microseconds assigned on acceptance, `0` before that.
  pub fn timestamp(&self) -> i64 {
    self.timestamp
  }

  /// Checks the structural invariants the broker owns. Identity semantics
  /// belong to the caller.
  pub(crate) fn validate(&self) -> Result<(), ChatError> {
    if self.sender.is_empty() {
      return Err(ChatError::InvalidMessage("sender must not be empty".into()));
    }
    if let Route::Direct(recipient) = &self.route {
      if recipient.is_empty() {
        return Err(ChatError::InvalidMessage(
          "recipient is required unless the message is a broadcast".into(),
        ));
      }
    }
    Ok(())
  }

  /// Consumes the unaccepted message and returns the accepted copy.
  pub(crate) fn stamped(mut self, timestamp: i64) -> Self {
    self.timestamp = timestamp;
    self
  }
}

impl fmt::Debug for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Message")
      .field("sender", &self.sender)
      .field("route", &self.route)
      .field("content", &format!("{} bytes", self.content.len())) // Avoid printing chat text
      .field("timestamp", &self.timestamp)
      .finish()
  }
}
