// src/runtime/mailbox.rs

//! Per-user mailboxes built on bounded `async-channel` queues.
//!
//! A mailbox is split in two halves. The [`MailboxHandle`] lives in the
//! registry and is only written to by the dispatcher. The [`Mailbox`] is
//! handed to the registering caller and is the single consumer.

use crate::broker::options::MailboxPolicy;
use crate::error::ChatError;
use crate::message::Message;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use futures::{stream, Stream};
use tokio_util::sync::CancellationToken;

/// Default capacity for mailboxes registered without an explicit capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Result of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
  /// The message was queued on the mailbox.
  Delivered,
  /// The mailbox was full and stayed full for the policy's wait; the message was discarded.
  Dropped,
  /// The mailbox was closed between lookup and send.
  Closed,
}

/// State shared by both halves of one mailbox.
#[derive(Debug)]
struct MailboxShared {
  user_id: Arc<str>,
  capacity: usize,
  delivered: AtomicU64,
  dropped: AtomicU64,
}

/// Creates a mailbox for `user_id` holding at most `capacity` messages
/// (minimum 1).
pub fn mailbox(user_id: &str, capacity: usize) -> (MailboxHandle, Mailbox) {
  mailbox_with_cancellation(user_id, capacity, CancellationToken::new())
}

/// Like [`mailbox`], but reads end once `cancel` fires and the backlog is
/// empty, whether or not anyone closed the writing half.
pub fn mailbox_with_cancellation(
  user_id: &str,
  capacity: usize,
  cancel: CancellationToken,
) -> (MailboxHandle, Mailbox) {
  let capacity = capacity.max(1);
  let (tx, rx) = async_channel::bounded(capacity);
  let shared = Arc::new(MailboxShared {
    user_id: Arc::from(user_id),
    capacity,
    delivered: AtomicU64::new(0),
    dropped: AtomicU64::new(0),
  });
  let handle = MailboxHandle {
    tx,
    drain_rx: rx.clone(),
    shared: shared.clone(),
  };
  (handle, Mailbox { rx, shared, cancel })
}

/// The writing half of a mailbox, held by the registry.
///
/// Cloning is cheap; every clone targets the same queue.
#[derive(Clone)]
pub struct MailboxHandle {
  tx: Sender<Message>,
  // Used only to discard pending messages once the mailbox is closed.
  drain_rx: Receiver<Message>,
  shared: Arc<MailboxShared>,
}

impl MailboxHandle {
  pub fn user_id(&self) -> &str {
    &self.shared.user_id
  }

  pub fn capacity(&self) -> usize {
    self.shared.capacity
  }

  /// Number of messages currently queued.
  pub fn len(&self) -> usize {
    self.tx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tx.is_empty()
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Total deliveries dropped because this mailbox was full.
  pub fn dropped(&self) -> u64 {
    self.shared.dropped.load(Ordering::Relaxed)
  }

  /// Total messages successfully queued on this mailbox.
  pub fn delivered(&self) -> u64 {
    self.shared.delivered.load(Ordering::Relaxed)
  }

  /// Attempts to queue `msg`, honouring `policy` when the mailbox is full.
  ///
  /// Never waits longer than the policy allows. With `MailboxPolicy::Drop`
  /// the newest message is the one discarded, so queued messages keep their
  /// order and the oldest are retained.
  pub(crate) async fn deliver(&self, msg: Message, policy: MailboxPolicy) -> DeliveryOutcome {
    let outcome = match policy {
      MailboxPolicy::Drop => match self.tx.try_send(msg) {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(TrySendError::Full(_)) => DeliveryOutcome::Dropped,
        Err(TrySendError::Closed(_)) => DeliveryOutcome::Closed,
      },
      MailboxPolicy::BlockWithTimeout(wait) => match tokio::time::timeout(wait, self.tx.send(msg)).await {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(_)) => DeliveryOutcome::Closed,
        Err(_) => DeliveryOutcome::Dropped,
      },
    };
    match outcome {
      DeliveryOutcome::Delivered => {
        self.shared.delivered.fetch_add(1, Ordering::Relaxed);
      }
      DeliveryOutcome::Dropped => {
        self.shared.dropped.fetch_add(1, Ordering::Relaxed);
      }
      DeliveryOutcome::Closed => {}
    }
    outcome
  }

  /// Closes the mailbox so no further deliveries are accepted.
  ///
  /// With `discard_pending` the queued messages are removed as well and the
  /// consumer sees end-of-stream immediately. Returns the number discarded.
  /// Never blocks, so it may be called with the registry lock held.
  pub(crate) fn close(&self, discard_pending: bool) -> usize {
    self.tx.close();
    let mut discarded = 0;
    if discard_pending {
      while self.drain_rx.try_recv().is_ok() {
        discarded += 1;
      }
    }
    discarded
  }
}

impl fmt::Debug for MailboxHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MailboxHandle")
      .field("user_id", &self.shared.user_id)
      .field("capacity", &self.shared.capacity)
      .field("len", &self.tx.len())
      .field("closed", &self.tx.is_closed())
      .finish()
  }
}

/// The reading half of a mailbox. Exactly one consumer owns it.
pub struct Mailbox {
  rx: Receiver<Message>,
  shared: Arc<MailboxShared>,
  cancel: CancellationToken,
}

impl Mailbox {
  /// Waits for the next message.
  ///
  /// Returns `ChatError::BrokerClosed` once the mailbox has been closed
  /// (replaced, unregistered, shut down or cancelled) and nothing is left
  /// to read.
  pub async fn recv(&self) -> Result<Message, ChatError> {
    tokio::select! {
      biased;
      received = self.rx.recv() => received.map_err(|_| ChatError::BrokerClosed),
      _ = self.cancel.cancelled() => self.rx.try_recv().map_err(|_| ChatError::BrokerClosed),
    }
  }

  /// Returns the next message if one is queued, without waiting.
  pub fn try_recv(&self) -> Result<Option<Message>, ChatError> {
    match self.rx.try_recv() {
      Ok(msg) => Ok(Some(msg)),
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Closed) => Err(ChatError::BrokerClosed),
    }
  }

  /// Converts the mailbox into a stream that ends when the mailbox closes.
  pub fn into_stream(self) -> impl Stream<Item = Message> {
    stream::unfold(self, |mailbox| async move {
      let msg = mailbox.recv().await.ok()?;
      Some((msg, mailbox))
    })
  }

  pub fn user_id(&self) -> &str {
    &self.shared.user_id
  }

  pub fn capacity(&self) -> usize {
    self.shared.capacity
  }

  pub fn len(&self) -> usize {
    self.rx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rx.is_empty()
  }

  /// True once the broker stopped delivering here. Already queued messages
  /// may still be readable.
  pub fn is_closed(&self) -> bool {
    self.rx.is_closed() || self.cancel.is_cancelled()
  }

  /// Deliveries to this user that were dropped because the mailbox was full.
  pub fn dropped(&self) -> u64 {
    self.shared.dropped.load(Ordering::Relaxed)
  }

  pub fn delivered(&self) -> u64 {
    self.shared.delivered.load(Ordering::Relaxed)
  }
}

impl fmt::Debug for Mailbox {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Mailbox")
      .field("user_id", &self.shared.user_id)
      .field("capacity", &self.shared.capacity)
      .field("len", &self.rx.len())
      .field("closed", &self.rx.is_closed())
      .finish()
  }
}
