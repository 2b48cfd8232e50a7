//! Message-related types (`Message`, `Route`) and the broker's timestamp clock.

mod clock;
mod msg;

pub use clock::StampClock;
pub use msg::{Message, Route};
