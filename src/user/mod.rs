//! In-memory user directory with structural validation.
//!
//! The broker itself trusts the ids it is given; this module is the check
//! an identity layer can run before handing ids to it.

mod manager;
mod model;

pub use manager::UserManager;
pub use model::User;
