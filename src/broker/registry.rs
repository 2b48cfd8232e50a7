use crate::error::ChatError;
use crate::runtime::{mailbox_with_cancellation, Mailbox, MailboxHandle};

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Outcome of a successful registration.
#[derive(Debug)]
pub struct Registration {
  /// The consuming half for the caller.
  pub mailbox: Mailbox,
  /// Pending messages discarded from the mailbox this one replaced, if any.
  pub replaced: Option<usize>,
}

#[derive(Debug, Default)]
struct RegistryInner {
  mailboxes: HashMap<String, MailboxHandle>,
  // Set by `close_all`; later registrations are refused.
  closed: bool,
}

/// Concurrency-safe directory of live mailboxes keyed by user id.
///
/// Every key maps to exactly one open mailbox. The lock is never held across
/// an await or a blocking send: closing a mailbox and discarding its backlog
/// are both non-blocking.
#[derive(Debug, Default)]
pub struct Registry {
  inner: RwLock<RegistryInner>,
  // Handed to every mailbox so readers wake when the broker is cancelled.
  cancel: CancellationToken,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a registry whose mailboxes stop blocking readers once `cancel`
  /// fires.
  pub fn with_cancellation(cancel: CancellationToken) -> Self {
    Self {
      inner: RwLock::new(RegistryInner::default()),
      cancel,
    }
  }

  /// Installs a fresh mailbox for `user_id`.
  ///
  /// A mailbox already registered under the same id is closed, its pending
  /// messages discarded, and replaced in the same critical section.
  pub fn register(&self, user_id: &str, capacity: usize) -> Result<Registration, ChatError> {
    if capacity == 0 {
      return Err(ChatError::InvalidArgument("mailbox capacity must be at least 1".into()));
    }
    let (handle, mailbox) = mailbox_with_cancellation(user_id, capacity, self.cancel.clone());
    let mut inner = self.inner.write();
    if inner.closed {
      return Err(ChatError::BrokerClosed);
    }
    let replaced = inner
      .mailboxes
      .insert(user_id.to_string(), handle)
      .map(|previous| previous.close(true));
    drop(inner);

    match replaced {
      Some(discarded) => {
        tracing::debug!(user_id = %user_id, capacity, discarded, "Registry replaced mailbox")
      }
      None => tracing::debug!(user_id = %user_id, capacity, "Registry added mailbox"),
    }
    Ok(Registration { mailbox, replaced })
  }

  /// Closes and removes the mailbox for `user_id`. Absent ids are a no-op.
  /// Returns the number of pending messages discarded, or `None` if the id
  /// was not registered.
  pub fn unregister(&self, user_id: &str) -> Option<usize> {
    let removed = self.inner.write().mailboxes.remove(user_id);
    removed.map(|handle| {
      let discarded = handle.close(true);
      tracing::debug!(user_id = %user_id, discarded, "Registry removed mailbox");
      discarded
    })
  }

  /// Returns the live mailbox handle for `user_id`.
  pub fn lookup(&self, user_id: &str) -> Result<MailboxHandle, ChatError> {
    let inner = self.inner.read();
    let handle = inner
      .mailboxes
      .get(user_id)
      .ok_or_else(|| ChatError::RecipientNotFound(user_id.to_string()))?;
    if handle.is_closed() {
      // Mailboxes are only closed while being removed or replaced under the
      // write lock, so a closed handle here is a bug.
      tracing::error!(user_id = %user_id, "Registry holds a closed mailbox");
      debug_assert!(false, "registry returned a closed mailbox for {}", user_id);
    }
    Ok(handle.clone())
  }

  /// Copies the current (id, handle) pairs, sorted by id. The lock is
  /// released before the caller uses any handle.
  pub fn snapshot_all(&self) -> Vec<(String, MailboxHandle)> {
    let mut snapshot: Vec<(String, MailboxHandle)> = {
      let inner = self.inner.read();
      inner
        .mailboxes
        .iter()
        .map(|(id, handle)| (id.clone(), handle.clone()))
        .collect()
    };
    snapshot.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    snapshot
  }

  pub fn contains(&self, user_id: &str) -> bool {
    self.inner.read().mailboxes.contains_key(user_id)
  }

  pub fn len(&self) -> usize {
    self.inner.read().mailboxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.read().mailboxes.is_empty()
  }

  /// Registered user ids, sorted.
  pub fn user_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.inner.read().mailboxes.keys().cloned().collect();
    ids.sort_unstable();
    ids
  }

  /// Closes every mailbox, empties the registry and refuses further
  /// registrations. Already-queued messages stay readable by their consumers.
  /// Returns how many mailboxes were closed.
  pub fn close_all(&self) -> usize {
    let drained: Vec<MailboxHandle> = {
      let mut inner = self.inner.write();
      inner.closed = true;
      inner.mailboxes.drain().map(|(_, handle)| handle).collect()
    };
    for handle in &drained {
      handle.close(false);
    }
    tracing::debug!(count = drained.len(), "Registry closed all mailboxes");
    drained.len()
  }

  pub fn is_closed(&self) -> bool {
    self.inner.read().closed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::broker::options::MailboxPolicy;
  use crate::message::Message;

  #[tokio::test]
  async fn reregistering_replaces_and_closes_the_old_mailbox() {
    let registry = Registry::new();
    let first = registry.register("bob", 4).unwrap();
    assert!(first.replaced.is_none());

    registry
      .lookup("bob")
      .unwrap()
      .deliver(Message::direct("alice", "bob", "old"), MailboxPolicy::Drop)
      .await;

    let second = registry.register("bob", 4).unwrap();
    assert_eq!(second.replaced, Some(1));
    assert!(first.mailbox.is_closed());
    assert_eq!(first.mailbox.recv().await, Err(ChatError::BrokerClosed));
    assert!(!second.mailbox.is_closed());
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn unregister_is_idempotent() {
    let registry = Registry::new();
    let reg = registry.register("bob", 1).unwrap();
    assert_eq!(registry.unregister("bob"), Some(0));
    assert_eq!(registry.unregister("bob"), None);
    assert!(reg.mailbox.is_closed());
    assert_eq!(
      registry.lookup("bob").unwrap_err(),
      ChatError::RecipientNotFound("bob".into())
    );
  }

  #[test]
  fn snapshot_is_sorted_and_detached() {
    let registry = Registry::new();
    let _c = registry.register("carol", 1).unwrap();
    let _a = registry.register("alice", 1).unwrap();
    let _b = registry.register("bob", 1).unwrap();

    let snapshot = registry.snapshot_all();
    registry.unregister("bob");

    let ids: Vec<&str> = snapshot.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["alice", "bob", "carol"]);
    assert_eq!(registry.user_ids(), vec!["alice".to_string(), "carol".to_string()]);
  }

  #[test]
  fn close_all_refuses_later_registrations() {
    let registry = Registry::new();
    let reg = registry.register("alice", 1).unwrap();
    assert_eq!(registry.close_all(), 1);
    assert!(reg.mailbox.is_closed());
    assert!(registry.is_empty());
    assert!(registry.is_closed());
    assert_eq!(registry.register("bob", 1).unwrap_err(), ChatError::BrokerClosed);
  }

  #[test]
  fn zero_capacity_is_invalid() {
    let registry = Registry::new();
    assert!(matches!(
      registry.register("bob", 0),
      Err(ChatError::InvalidArgument(_))
    ));
    assert!(!registry.contains("bob"));
  }
}
