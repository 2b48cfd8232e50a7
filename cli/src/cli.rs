use chatcore::{DrainPolicy, MailboxPolicy, QueuePolicy};
use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "chatcore", version, about = "chatcore Command Line Utility")]
pub struct Cli {
  /// Log filter used when RUST_LOG is not set
  #[clap(long, global = true, default_value = "chatcore=info,warn")]
  pub log_filter: String,

  #[clap(subcommand)]
  pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
  /// Run a broker with simulated users exchanging messages, then print stats
  Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
  /// Number of simulated users
  #[clap(long, short, default_value_t = 4)]
  pub users: usize,

  /// Messages each user sends
  #[clap(long, short, default_value_t = 50)]
  pub messages: usize,

  /// Percentage of messages sent as broadcasts (0-100)
  #[clap(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=100))]
  pub broadcast_percent: u8,

  /// Capacity of the broker's inbound queue
  #[clap(long, default_value_t = chatcore::broker::options::DEFAULT_INBOUND_CAPACITY)]
  pub inbound_capacity: usize,

  /// Capacity of each user's mailbox
  #[clap(long, default_value_t = chatcore::runtime::DEFAULT_MAILBOX_CAPACITY)]
  pub mailbox_capacity: usize,

  /// What submit does when the inbound queue is full: "block" or "reject"
  #[clap(long, default_value = "block")]
  pub queue_policy: QueuePolicy,

  /// What delivery does when a mailbox is full: "drop" or "block:<ms>"
  #[clap(long, default_value = "drop")]
  pub mailbox_policy: MailboxPolicy,

  /// What shutdown does with queued messages: "process" or "discard"
  #[clap(long, default_value = "process")]
  pub drain_policy: DrainPolicy,

  /// Users that never read their mailbox, to exercise drop handling
  #[clap(long, default_value_t = 0)]
  pub idle_readers: usize,
}
