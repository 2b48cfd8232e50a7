//! The broker: registry, dispatcher, delivery policies and lifecycle.

pub mod core;
mod dispatcher;
mod distributor;
mod drop_guard;
pub mod options;
pub mod registry;
pub mod state;
pub mod stats;

pub use self::core::Broker;
pub use options::{BrokerConfig, DrainPolicy, MailboxPolicy, QueuePolicy};
pub use registry::{Registration, Registry};
pub use state::BrokerState;
pub use stats::BrokerStats;
