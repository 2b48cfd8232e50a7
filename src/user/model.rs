use crate::error::ChatError;

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is a valid regex")
});

/// A chat user as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
}

impl User {
  pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      email: email.into(),
    }
  }

  /// Checks name, email and id, in that order, reporting the first problem.
  pub fn validate(&self) -> Result<(), ChatError> {
    if self.name.trim().is_empty() {
      return Err(ChatError::InvalidUser("name must not be empty".into()));
    }
    if !EMAIL_PATTERN.is_match(&self.email) {
      return Err(ChatError::InvalidUser(format!("invalid email '{}'", self.email)));
    }
    if self.id.trim().is_empty() {
      return Err(ChatError::InvalidUser("id must not be empty".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn valid_user_passes() {
    assert!(User::new("1", "Alice", "alice@example.com").validate().is_ok());
    assert!(User::new("u-2", "Bob", "bob.smith+chat@mail.example.org").validate().is_ok());
  }

  #[test]
  fn name_is_checked_first() {
    let err = User::new("", "", "not-an-email").validate().unwrap_err();
    assert_eq!(err, ChatError::InvalidUser("name must not be empty".into()));
  }

  #[test]
  fn malformed_emails_are_rejected() {
    for email in ["", "alice", "alice@", "@example.com", "alice@example", "alice@example.c"] {
      assert!(
        matches!(User::new("1", "Alice", email).validate(), Err(ChatError::InvalidUser(_))),
        "email {:?} should be rejected",
        email
      );
    }
  }

  #[test]
  fn empty_id_is_rejected() {
    assert_eq!(
      User::new(" ", "Alice", "alice@example.com").validate(),
      Err(ChatError::InvalidUser("id must not be empty".into()))
    );
  }
}
