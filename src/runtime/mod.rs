// src/runtime/mod.rs

//! Core asynchronous primitives: Mailboxes, broker events, the event bus and
//! the stop latch.

pub mod broker_events;
pub mod event_bus;
pub mod mailbox;
pub mod stop_latch;

pub use mailbox::{mailbox, mailbox_with_cancellation, DeliveryOutcome, Mailbox, MailboxHandle, DEFAULT_MAILBOX_CAPACITY};

// System Coordination
pub use broker_events::BrokerEvent;
pub use event_bus::{EventBus, EventReceiver};

// Sync Primitives
pub(crate) use stop_latch::StopLatch;
