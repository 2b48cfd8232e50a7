// src/lib.rs

//! chatcore - an in-process chat message broker on Tokio.
//!
//! A [`Broker`] accepts messages from any number of producers onto one
//! bounded inbound queue. A single dispatcher drains that queue in
//! submission order and delivers each message either to its addressed
//! recipient or, for broadcasts, to every user registered at that moment.
//! Each registered user owns a bounded [`Mailbox`]; full mailboxes are
//! handled by an explicit [`MailboxPolicy`] so one slow reader never stalls
//! the others.

/// The broker handle, registry, dispatcher and configuration.
pub mod broker;
/// Defines the error type used throughout the library.
pub mod error;
/// The message envelope and its timestamp clock.
pub mod message;
/// Mailboxes, broker events and the event bus.
pub mod runtime;
/// User directory with structural validation.
pub mod user;

pub use broker::{Broker, BrokerConfig, BrokerState, BrokerStats, DrainPolicy, MailboxPolicy, QueuePolicy, Registry};
pub use error::ChatError;
pub use message::{Message, Route};
pub use runtime::{BrokerEvent, DeliveryOutcome, EventReceiver, Mailbox, MailboxHandle};
pub use user::{User, UserManager};

/// Major version number of the chatcore library.
const VERSION_MAJOR: i32 = 0;
/// Minor version number of the chatcore library.
const VERSION_MINOR: i32 = 1;
/// Patch version number of the chatcore library.
const VERSION_PATCH: i32 = 0;

/// Returns the library version as a tuple (major, minor, patch).
///
/// # Examples
///
/// ```
/// let (major, minor, patch) = chatcore::version();
/// println!("chatcore version: {}.{}.{}", major, minor, patch);
/// ```
pub fn version() -> (i32, i32, i32) {
  (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
