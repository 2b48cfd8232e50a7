use crate::broker::dispatcher::Dispatcher;
use crate::broker::drop_guard::DispatcherDropGuard;
use crate::broker::options::{BrokerConfig, DrainPolicy, QueuePolicy};
use crate::broker::registry::Registry;
use crate::broker::state::{BrokerState, StateCell};
use crate::broker::stats::{BrokerStats, StatsCounters};
use crate::error::ChatError;
use crate::message::{Message, StampClock};
use crate::runtime::{BrokerEvent, EventBus, EventReceiver, Mailbox, StopLatch};

use std::fmt;
use std::sync::Arc;

use async_channel::{Receiver, Sender, TrySendError};
use tokio_util::sync::CancellationToken;

/// Holds the state shared by every `Broker` handle.
pub(crate) struct BrokerInner {
  config: BrokerConfig,
  inbound_tx: Sender<Message>,
  inbound_rx: Receiver<Message>,
  registry: Registry,
  state: StateCell,
  cancel: CancellationToken,
  event_bus: EventBus,
  stats: StatsCounters,
  clock: StampClock,
  // Stamps are settled against this at dispatch, so recipients never see
  // them go backwards even when a blocked submitter enqueues late.
  dispatch_clock: StampClock,
  stopped: StopLatch,
}

impl BrokerInner {
  fn new(config: BrokerConfig, cancel: CancellationToken) -> Self {
    let (inbound_tx, inbound_rx) = async_channel::bounded(config.inbound_capacity);
    let event_bus = EventBus::with_capacity(config.event_capacity);
    Self {
      config,
      inbound_tx,
      inbound_rx,
      registry: Registry::with_cancellation(cancel.clone()),
      state: StateCell::new(),
      cancel,
      event_bus,
      stats: StatsCounters::default(),
      clock: StampClock::new(),
      dispatch_clock: StampClock::new(),
      stopped: StopLatch::new(),
    }
  }

  pub(crate) fn config(&self) -> &BrokerConfig {
    &self.config
  }

  pub(crate) fn registry(&self) -> &Registry {
    &self.registry
  }

  pub(crate) fn event_bus(&self) -> &EventBus {
    &self.event_bus
  }

  pub(crate) fn stats(&self) -> &StatsCounters {
    &self.stats
  }

  pub(crate) fn inbound_receiver(&self) -> &Receiver<Message> {
    &self.inbound_rx
  }

  pub(crate) fn cancellation_token(&self) -> &CancellationToken {
    &self.cancel
  }

  pub(crate) fn dispatch_clock(&self) -> &StampClock {
    &self.dispatch_clock
  }

  /// True once shutdown began under `DrainPolicy::Discard`, or after
  /// cancellation: queued messages are thrown away instead of routed.
  pub(crate) fn discarding(&self) -> bool {
    self.cancel.is_cancelled()
      || (!self.state.load().is_accepting() && self.config.drain_policy == DrainPolicy::Discard)
  }

  fn ensure_accepting(&self) -> Result<(), ChatError> {
    if self.cancel.is_cancelled() || !self.state.load().is_accepting() {
      return Err(ChatError::BrokerClosed);
    }
    Ok(())
  }

  /// Moves the lifecycle forward and announces it. Returns false if the
  /// broker was already at or past `to`.
  fn advance_state(&self, to: BrokerState) -> bool {
    match self.state.advance(to) {
      Some(from) => {
        tracing::info!(%from, %to, "Broker state changed");
        self.event_bus.emit(BrokerEvent::StateChanged { from, to });
        true
      }
      None => false,
    }
  }

  fn announce_transition(&self, from: BrokerState, to: BrokerState) {
    tracing::info!(%from, %to, "Broker state changed");
    self.event_bus.emit(BrokerEvent::StateChanged { from, to });
  }

  /// Checks the message and stamps it. Direct messages must address a user
  /// registered right now.
  fn admit(&self, message: Message) -> Result<Message, ChatError> {
    message.validate()?;
    self.ensure_accepting()?;
    if let Some(recipient) = message.recipient() {
      if !self.registry.contains(recipient) {
        tracing::debug!(recipient = %recipient, sender = %message.sender(), "Submit rejected: recipient not registered");
        return Err(ChatError::RecipientNotFound(recipient.to_string()));
      }
    }
    Ok(message.stamped(self.clock.stamp()))
  }

  fn try_enqueue(&self, message: Message) -> Result<(), ChatError> {
    match self.inbound_tx.try_send(message) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => {
        tracing::debug!(capacity = self.config.inbound_capacity, "Inbound queue full, rejecting submit");
        Err(ChatError::QueueFull)
      }
      Err(TrySendError::Closed(_)) => Err(ChatError::BrokerClosed),
    }
  }

  /// Tears down a cancelled broker whose dispatcher never started. A running
  /// dispatcher observes the signal itself and finalizes on exit.
  fn reap_if_cancelled(&self) {
    if !self.cancel.is_cancelled() {
      return;
    }
    if self
      .state
      .transition(BrokerState::Created, BrokerState::ShuttingDown)
      .is_ok()
    {
      self.announce_transition(BrokerState::Created, BrokerState::ShuttingDown);
      self.finalize();
    }
  }

  /// Final teardown shared by every exit path: stop intake, discard whatever
  /// is still queued, close all mailboxes, mark `Stopped` and release
  /// `shutdown` waiters. Idempotent and non-blocking.
  pub(crate) fn finalize(&self) {
    self.advance_state(BrokerState::ShuttingDown);
    self.inbound_tx.close();

    let mut discarded = 0u64;
    while self.inbound_rx.try_recv().is_ok() {
      discarded += 1;
    }
    self.stats.record_discarded(discarded);

    let closed = self.registry.close_all();
    if self.advance_state(BrokerState::Stopped) {
      tracing::info!(mailboxes_closed = closed, discarded, "Broker stopped");
    }
    self.stopped.release();
  }
}

impl fmt::Debug for BrokerInner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BrokerInner")
      .field("state", &self.state.load())
      .field("registered", &self.registry.len())
      .field("queued", &self.inbound_tx.len())
      .field("config", &self.config)
      .finish_non_exhaustive()
  }
}

/// A handle to a chat broker. Handles are cloneable (`Arc`-based); every
/// clone talks to the same registry, queue and dispatcher.
///
/// ```no_run
/// # async fn demo() -> Result<(), chatcore::ChatError> {
/// use chatcore::{Broker, BrokerConfig, Message};
///
/// let broker = Broker::new(BrokerConfig::default())?;
/// let dispatcher = tokio::spawn({
///   let broker = broker.clone();
///   async move { broker.run().await }
/// });
///
/// let bob = broker.register("bob", 16)?;
/// broker.register_default("alice")?;
/// broker.submit(Message::direct("alice", "bob", "hi")).await?;
/// assert_eq!(bob.recv().await?.content(), "hi");
///
/// broker.shutdown().await?;
/// # let _ = dispatcher.await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Broker {
  inner: Arc<BrokerInner>,
}

impl Broker {
  /// Creates a broker in the `Created` state with its own cancellation signal.
  pub fn new(config: BrokerConfig) -> Result<Self, ChatError> {
    Self::with_cancellation(config, CancellationToken::new())
  }

  /// Creates a broker whose cancellation signal is a child of `parent`:
  /// cancelling the parent stops the broker, cancelling the broker leaves
  /// the parent alone.
  pub fn with_cancellation(config: BrokerConfig, parent: CancellationToken) -> Result<Self, ChatError> {
    config.validate()?;
    tracing::debug!(
      inbound_capacity = config.inbound_capacity,
      mailbox_capacity = config.mailbox_capacity,
      full_queue_policy = ?config.full_queue_policy,
      full_mailbox_policy = %config.full_mailbox_policy,
      drain_policy = ?config.drain_policy,
      "Creating new Broker"
    );
    Ok(Self {
      inner: Arc::new(BrokerInner::new(config, parent.child_token())),
    })
  }

  /// Runs the dispatcher loop until the broker is shut down or cancelled.
  ///
  /// Exactly one caller may run it. A second concurrent call returns
  /// `InvalidState`; a call after shutdown began returns `BrokerClosed`.
  pub async fn run(&self) -> Result<(), ChatError> {
    match self.inner.state.transition(BrokerState::Created, BrokerState::Running) {
      Ok(()) => self.inner.announce_transition(BrokerState::Created, BrokerState::Running),
      Err(BrokerState::Running) => return Err(ChatError::InvalidState("dispatcher is already running")),
      Err(_) => return Err(ChatError::BrokerClosed),
    }

    let guard = DispatcherDropGuard::new(self.inner.clone());
    Dispatcher::new(&self.inner).run_loop().await;
    self.inner.finalize();
    guard.waive();
    Ok(())
  }

  /// Accepts a message for routing.
  ///
  /// Fails with `InvalidMessage` for a missing sender or recipient,
  /// `RecipientNotFound` if a direct message addresses an unregistered user,
  /// `BrokerClosed` once shutdown began or the broker was cancelled, and
  /// `QueueFull` when the inbound queue is full under `QueuePolicy::Reject`.
  /// Under `QueuePolicy::Block` it waits for space instead.
  pub async fn submit(&self, message: Message) -> Result<(), ChatError> {
    let message = self.inner.admit(message)?;
    match self.inner.config.full_queue_policy {
      QueuePolicy::Reject => self.inner.try_enqueue(message)?,
      QueuePolicy::Block => {
        tokio::select! {
          biased;
          _ = self.inner.cancel.cancelled() => return Err(ChatError::BrokerClosed),
          sent = self.inner.inbound_tx.send(message) => sent.map_err(|_| ChatError::BrokerClosed)?,
        }
      }
    }
    self.inner.stats.record_submitted();
    Ok(())
  }

  /// Like `submit`, but never waits: a full queue is always `QueueFull`.
  pub fn try_submit(&self, message: Message) -> Result<(), ChatError> {
    let message = self.inner.admit(message)?;
    self.inner.try_enqueue(message)?;
    self.inner.stats.record_submitted();
    Ok(())
  }

  /// Installs a mailbox of `capacity` messages for `user_id`, closing and
  /// replacing any mailbox the id already had.
  pub fn register(&self, user_id: &str, capacity: usize) -> Result<Mailbox, ChatError> {
    self.inner.ensure_accepting()?;
    let registration = self.inner.registry.register(user_id, capacity)?;
    tracing::info!(user_id = %user_id, capacity, replaced = registration.replaced.is_some(), "User registered");
    self.inner.event_bus.emit(BrokerEvent::UserRegistered {
      user_id: user_id.to_string(),
      capacity,
      replaced: registration.replaced.is_some(),
    });
    Ok(registration.mailbox)
  }

  /// `register` with the configured default mailbox capacity.
  pub fn register_default(&self, user_id: &str) -> Result<Mailbox, ChatError> {
    self.register(user_id, self.inner.config.mailbox_capacity)
  }

  /// Closes and removes the mailbox for `user_id`, discarding anything still
  /// queued. Unknown ids are ignored; allowed in every state.
  pub fn unregister(&self, user_id: &str) {
    if let Some(discarded) = self.inner.registry.unregister(user_id) {
      tracing::info!(user_id = %user_id, discarded, "User unregistered");
      self.inner.event_bus.emit(BrokerEvent::UserUnregistered {
        user_id: user_id.to_string(),
        discarded,
      });
    }
  }

  /// Stops intake, drains the inbound queue per the configured
  /// `DrainPolicy`, closes every mailbox and waits for `Stopped`.
  ///
  /// Idempotent. Blocked `submit` calls fail with `BrokerClosed`. If `run`
  /// was never called the drain happens inline.
  pub async fn shutdown(&self) -> Result<(), ChatError> {
    self.inner.reap_if_cancelled();
    loop {
      match self.inner.state.load() {
        BrokerState::Created => {
          if self
            .inner
            .state
            .transition(BrokerState::Created, BrokerState::ShuttingDown)
            .is_err()
          {
            continue; // `run` won the race; re-read.
          }
          self.inner.announce_transition(BrokerState::Created, BrokerState::ShuttingDown);
          self.inner.inbound_tx.close();
          if !self.inner.discarding() {
            Dispatcher::new(&self.inner).drain_closed_queue().await;
          }
          self.inner.finalize();
          return Ok(());
        }
        BrokerState::Running => {
          if self
            .inner
            .state
            .transition(BrokerState::Running, BrokerState::ShuttingDown)
            .is_err()
          {
            continue;
          }
          self.inner.announce_transition(BrokerState::Running, BrokerState::ShuttingDown);
          // Wakes blocked submitters; the loop exits once the queue is empty.
          self.inner.inbound_tx.close();
          break;
        }
        BrokerState::ShuttingDown | BrokerState::Stopped => break,
      }
    }
    self.inner.stopped.wait().await;
    Ok(())
  }

  /// Fires the broker's cancellation signal. The dispatcher stops promptly,
  /// queued messages are discarded, blocked submitters and mailbox readers
  /// are released. Without a running dispatcher the teardown happens here;
  /// otherwise use `shutdown` to wait for it.
  pub fn cancel(&self) {
    tracing::info!("Broker cancellation requested");
    self.inner.cancel.cancel();
    // Wake blocked submitters even if the dispatcher was never started.
    self.inner.inbound_tx.close();
    self.inner.reap_if_cancelled();
  }

  /// A clone of the broker's cancellation signal, for tying other tasks to
  /// the broker's lifetime.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.inner.cancel.clone()
  }

  /// Current lifecycle state. A broker cancelled through its parent token
  /// before `run` reports `Stopped` from here on.
  pub fn state(&self) -> BrokerState {
    self.inner.reap_if_cancelled();
    self.inner.state.load()
  }

  pub fn stats(&self) -> BrokerStats {
    self.inner.stats.snapshot()
  }

  /// Subscribes to broker events published from now on.
  pub fn subscribe(&self) -> EventReceiver {
    self.inner.event_bus.subscribe()
  }

  pub fn config(&self) -> &BrokerConfig {
    &self.inner.config
  }

  /// Currently registered user ids, sorted.
  pub fn registered_users(&self) -> Vec<String> {
    self.inner.registry.user_ids()
  }

  pub fn is_registered(&self, user_id: &str) -> bool {
    self.inner.registry.contains(user_id)
  }

  /// Messages waiting on the inbound queue.
  pub fn queued(&self) -> usize {
    self.inner.inbound_tx.len()
  }
}

impl fmt::Debug for Broker {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Broker").field("inner", &self.inner).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn late_blocked_submit_never_shows_an_older_stamp() {
    let config = BrokerConfig::default()
      .inbound_capacity(1)
      .full_queue_policy(QueuePolicy::Block);
    let broker = Broker::new(config).unwrap();
    let bob = broker.register("bob", 8).unwrap();

    broker.submit(Message::direct("alice", "bob", "x")).await.unwrap();
    let blocked = {
      let broker = broker.clone();
      tokio::spawn(async move { broker.submit(Message::direct("alice", "bob", "a")).await })
    };
    // Let "a" take its stamp and park on the full queue.
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Free the slot and refill it before the parked submitter is polled.
    assert_eq!(broker.inner.inbound_rx.try_recv().unwrap().content(), "x");
    broker.try_submit(Message::direct("alice", "bob", "b")).unwrap();

    let runner = {
      let broker = broker.clone();
      tokio::spawn(async move { broker.run().await })
    };
    blocked.await.unwrap().unwrap();

    let first = bob.recv().await.unwrap();
    let second = bob.recv().await.unwrap();
    assert_eq!(first.content(), "b");
    assert_eq!(second.content(), "a");
    assert!(
      second.timestamp() >= first.timestamp(),
      "stamps went backwards: {} then {}",
      first.timestamp(),
      second.timestamp()
    );

    broker.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
  }

  #[tokio::test]
  async fn cancel_before_run_tears_down_at_once() {
    let broker = Broker::new(BrokerConfig::default()).unwrap();
    let bob = broker.register("bob", 4).unwrap();
    broker.submit(Message::broadcast("bob", "pending")).await.unwrap();

    broker.cancel();
    assert_eq!(broker.inner.state.load(), BrokerState::Stopped);
    assert!(broker.inner.stopped.is_released());
    assert_eq!(broker.stats().discarded, 1);
    assert_eq!(bob.recv().await, Err(ChatError::BrokerClosed));
  }
}
