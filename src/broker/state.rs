use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Broker lifecycle. States only ever move forward:
/// `Created -> Running -> ShuttingDown -> Stopped`
/// (`Running` is skipped when a broker is shut down before `run`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BrokerState {
  Created = 0,
  Running = 1,
  ShuttingDown = 2,
  Stopped = 3,
}

impl BrokerState {
  fn from_u8(raw: u8) -> Self {
    match raw {
      0 => BrokerState::Created,
      1 => BrokerState::Running,
      2 => BrokerState::ShuttingDown,
      _ => BrokerState::Stopped,
    }
  }

  /// True while the broker still accepts submissions and registrations.
  pub fn is_accepting(self) -> bool {
    self <= BrokerState::Running
  }
}

impl fmt::Display for BrokerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BrokerState::Created => "created",
      BrokerState::Running => "running",
      BrokerState::ShuttingDown => "shutting-down",
      BrokerState::Stopped => "stopped",
    };
    f.write_str(name)
  }
}

/// Atomic cell holding a `BrokerState`.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
  pub fn new() -> Self {
    Self(AtomicU8::new(BrokerState::Created as u8))
  }

  pub fn load(&self) -> BrokerState {
    BrokerState::from_u8(self.0.load(Ordering::Acquire))
  }

  /// Moves from exactly `from` to `to`. On failure returns the actual state.
  pub fn transition(&self, from: BrokerState, to: BrokerState) -> Result<(), BrokerState> {
    debug_assert!(from < to, "broker state may only move forward");
    self
      .0
      .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
      .map(|_| ())
      .map_err(BrokerState::from_u8)
  }

  /// Moves forward to `to` unless the state is already there or later.
  /// Returns the previous state if a transition happened.
  pub fn advance(&self, to: BrokerState) -> Option<BrokerState> {
    let prev = BrokerState::from_u8(self.0.fetch_max(to as u8, Ordering::AcqRel));
    (prev < to).then_some(prev)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transition_requires_the_expected_state() {
    let cell = StateCell::new();
    assert_eq!(cell.transition(BrokerState::Created, BrokerState::Running), Ok(()));
    assert_eq!(
      cell.transition(BrokerState::Created, BrokerState::ShuttingDown),
      Err(BrokerState::Running)
    );
    assert_eq!(cell.load(), BrokerState::Running);
  }

  #[test]
  fn advance_never_moves_backwards() {
    let cell = StateCell::new();
    assert_eq!(cell.advance(BrokerState::Stopped), Some(BrokerState::Created));
    assert_eq!(cell.advance(BrokerState::ShuttingDown), None);
    assert_eq!(cell.load(), BrokerState::Stopped);
  }

  #[test]
  fn only_early_states_accept_work() {
    assert!(BrokerState::Created.is_accepting());
    assert!(BrokerState::Running.is_accepting());
    assert!(!BrokerState::ShuttingDown.is_accepting());
    assert!(!BrokerState::Stopped.is_accepting());
    assert_eq!(BrokerState::ShuttingDown.to_string(), "shutting-down");
  }
}
