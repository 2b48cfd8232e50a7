use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ChatError;
use crate::runtime::event_bus::DEFAULT_EVENT_BUS_CAPACITY;
use crate::runtime::DEFAULT_MAILBOX_CAPACITY;

pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 16;

/// What `submit` does when the inbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuePolicy {
  /// Wait for space. Unblocks with `BrokerClosed` on shutdown or cancellation.
  Block,
  /// Fail immediately with `QueueFull`.
  #[default]
  Reject,
}

/// What the dispatcher does when a recipient's mailbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailboxPolicy {
  /// Drop the incoming message at once; queued messages are kept.
  #[default]
  Drop,
  /// Wait up to the given duration for space, then drop the incoming message.
  BlockWithTimeout(Duration),
}

/// What happens to messages still on the inbound queue when `shutdown` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainPolicy {
  /// Route them normally before the mailboxes are closed.
  #[default]
  Process,
  /// Discard them unrouted.
  Discard,
}

/// Holds validated broker settings.
///
/// ```
/// use chatcore::{BrokerConfig, MailboxPolicy, QueuePolicy};
/// use std::time::Duration;
///
/// let config = BrokerConfig::default()
///   .inbound_capacity(256)
///   .full_queue_policy(QueuePolicy::Block)
///   .full_mailbox_policy(MailboxPolicy::BlockWithTimeout(Duration::from_millis(5)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
  /// Bound of the shared inbound queue between producers and the dispatcher.
  pub inbound_capacity: usize,
  /// Capacity used by `Broker::register_default`.
  pub mailbox_capacity: usize,
  pub full_queue_policy: QueuePolicy,
  pub full_mailbox_policy: MailboxPolicy,
  pub drain_policy: DrainPolicy,
  /// Maximum broadcast deliveries in flight at once.
  pub fanout_concurrency: usize,
  /// Events buffered per event bus subscriber.
  pub event_capacity: usize,
}

impl Default for BrokerConfig {
  fn default() -> Self {
    Self {
      inbound_capacity: DEFAULT_INBOUND_CAPACITY,
      mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
      full_queue_policy: QueuePolicy::default(),
      full_mailbox_policy: MailboxPolicy::default(),
      drain_policy: DrainPolicy::default(),
      fanout_concurrency: DEFAULT_FANOUT_CONCURRENCY,
      event_capacity: DEFAULT_EVENT_BUS_CAPACITY,
    }
  }
}

impl BrokerConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn inbound_capacity(mut self, capacity: usize) -> Self {
    self.inbound_capacity = capacity;
    self
  }

  pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
    self.mailbox_capacity = capacity;
    self
  }

  pub fn full_queue_policy(mut self, policy: QueuePolicy) -> Self {
    self.full_queue_policy = policy;
    self
  }

  pub fn full_mailbox_policy(mut self, policy: MailboxPolicy) -> Self {
    self.full_mailbox_policy = policy;
    self
  }

  pub fn drain_policy(mut self, policy: DrainPolicy) -> Self {
    self.drain_policy = policy;
    self
  }

  pub fn fanout_concurrency(mut self, concurrency: usize) -> Self {
    self.fanout_concurrency = concurrency;
    self
  }

  pub fn event_capacity(mut self, capacity: usize) -> Self {
    self.event_capacity = capacity;
    self
  }

  /// Rejects settings that would make the broker unbounded or stuck.
  pub fn validate(&self) -> Result<(), ChatError> {
    if self.inbound_capacity == 0 {
      return Err(ChatError::InvalidArgument("inbound_capacity must be at least 1".into()));
    }
    if self.mailbox_capacity == 0 {
      return Err(ChatError::InvalidArgument("mailbox_capacity must be at least 1".into()));
    }
    if self.fanout_concurrency == 0 {
      return Err(ChatError::InvalidArgument("fanout_concurrency must be at least 1".into()));
    }
    if self.event_capacity == 0 {
      return Err(ChatError::InvalidArgument("event_capacity must be at least 1".into()));
    }
    if let MailboxPolicy::BlockWithTimeout(wait) = self.full_mailbox_policy {
      if wait.is_zero() {
        return Err(ChatError::InvalidArgument(
          "block-with-timeout needs a non-zero timeout; use the drop policy instead".into(),
        ));
      }
    }
    Ok(())
  }
}

impl FromStr for QueuePolicy {
  type Err = ChatError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "block" => Ok(QueuePolicy::Block),
      "reject" => Ok(QueuePolicy::Reject),
      other => Err(ChatError::InvalidArgument(format!("unknown queue policy '{}'", other))),
    }
  }
}

impl FromStr for DrainPolicy {
  type Err = ChatError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "process" => Ok(DrainPolicy::Process),
      "discard" => Ok(DrainPolicy::Discard),
      other => Err(ChatError::InvalidArgument(format!("unknown drain policy '{}'", other))),
    }
  }
}

/// Accepts `drop` or `block:<millis>`.
impl FromStr for MailboxPolicy {
  type Err = ChatError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lowered = s.trim().to_ascii_lowercase();
    if lowered == "drop" {
      return Ok(MailboxPolicy::Drop);
    }
    if let Some(millis) = lowered.strip_prefix("block:") {
      let millis: u64 = millis
        .trim_end_matches("ms")
        .parse()
        .map_err(|_| ChatError::InvalidArgument(format!("invalid timeout in mailbox policy '{}'", s)))?;
      return Ok(MailboxPolicy::BlockWithTimeout(Duration::from_millis(millis)));
    }
    Err(ChatError::InvalidArgument(format!("unknown mailbox policy '{}'", s)))
  }
}

impl fmt::Display for MailboxPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MailboxPolicy::Drop => f.write_str("drop"),
      MailboxPolicy::BlockWithTimeout(wait) => write!(f, "block:{}ms", wait.as_millis()),
    }
  }
}
