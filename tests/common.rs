// tests/common.rs
#![allow(dead_code)] // Not every test binary uses every helper

use chatcore::{Broker, BrokerConfig, BrokerEvent, ChatError, EventReceiver, Mailbox, Message};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use std::sync::Once;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(250);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(2);

// Use std::sync::Once for one-time initialization
static TRACING_INIT: Once = Once::new();

// Setup function to initialize tracing
fn setup_tracing() {
  TRACING_INIT.call_once(|| {
    // Can be overridden by RUST_LOG env variable
    let default_filter = "chatcore=debug,warn";
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_line_number(true)
      .with_test_writer() // Write to test output capture
      .finish();

    // Another test binary thread may have won the race; that is fine.
    let _ = tracing::subscriber::set_global_default(subscriber);
  });
}

/// Creates a broker without starting its dispatcher.
pub fn test_broker(config: BrokerConfig) -> Broker {
  setup_tracing();
  Broker::new(config).expect("Failed to create test broker")
}

/// Creates a broker and spawns its dispatcher loop.
pub fn running_broker(config: BrokerConfig) -> (Broker, JoinHandle<Result<(), ChatError>>) {
  let broker = test_broker(config);
  let runner = broker.clone();
  let handle = tokio::spawn(async move { runner.run().await });
  (broker, handle)
}

// Helper for recv with timeout assertion
pub async fn recv_timeout(mailbox: &Mailbox, duration: Duration) -> Result<Message, ChatError> {
  match timeout(duration, mailbox.recv()).await {
    Ok(result) => result,
    Err(_) => Err(ChatError::Internal(format!(
      "no message for {} within {:?}",
      mailbox.user_id(),
      duration
    ))),
  }
}

/// Asserts nothing arrives on `mailbox` for a short while.
pub async fn assert_silent(mailbox: &Mailbox) {
  match timeout(Duration::from_millis(50), mailbox.recv()).await {
    Err(_) => {}
    Ok(Ok(msg)) => panic!("{} unexpectedly received {:?}", mailbox.user_id(), msg),
    Ok(Err(e)) => panic!("{} mailbox failed: {}", mailbox.user_id(), e),
  }
}

/// Polls `check` until it holds or `LONG_TIMEOUT` passes.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
  let start = tokio::time::Instant::now();
  while !check() {
    if start.elapsed() > LONG_TIMEOUT {
      panic!("condition not met within {:?}", LONG_TIMEOUT);
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
}

/// Waits for the first event matching `check`, skipping others.
pub async fn wait_for_event(
  events: &mut EventReceiver,
  check: impl Fn(&BrokerEvent) -> bool,
) -> Result<BrokerEvent, String> {
  let deadline = tokio::time::Instant::now() + LONG_TIMEOUT;
  loop {
    match tokio::time::timeout_at(deadline, events.recv()).await {
      Ok(Ok(event)) => {
        if check(&event) {
          return Ok(event);
        }
      }
      Ok(Err(e)) => return Err(format!("event channel error: {}", e)),
      Err(_) => return Err(format!("no matching event within {:?}", LONG_TIMEOUT)),
    }
  }
}
