use crate::error::ChatError;
use crate::user::User;

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

/// Concurrency-safe directory of known users keyed by id.
///
/// Mutations are refused once the manager's cancellation token fires.
#[derive(Debug, Default)]
pub struct UserManager {
  users: RwLock<HashMap<String, User>>,
  cancel: CancellationToken,
}

impl UserManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Creates a manager that stops accepting users when `cancel` fires.
  pub fn with_cancellation(cancel: CancellationToken) -> Self {
    Self {
      users: RwLock::new(HashMap::new()),
      cancel,
    }
  }

  /// Validates and stores `user`, replacing any user with the same id.
  pub fn add_user(&self, user: User) -> Result<(), ChatError> {
    user.validate()?;
    if self.cancel.is_cancelled() {
      return Err(ChatError::Cancelled);
    }
    tracing::debug!(user_id = %user.id, "User added to directory");
    self.users.write().insert(user.id.clone(), user);
    Ok(())
  }

  /// Removes and returns the user with `id`.
  pub fn remove_user(&self, id: &str) -> Result<User, ChatError> {
    self
      .users
      .write()
      .remove(id)
      .ok_or_else(|| ChatError::UserNotFound(id.to_string()))
  }

  pub fn get_user(&self, id: &str) -> Result<User, ChatError> {
    self
      .users
      .read()
      .get(id)
      .cloned()
      .ok_or_else(|| ChatError::UserNotFound(id.to_string()))
  }

  /// All users, sorted by id.
  pub fn list(&self) -> Vec<User> {
    let mut users: Vec<User> = self.users.read().values().cloned().collect();
    users.sort_by(|a, b| a.id.cmp(&b.id));
    users
  }

  pub fn len(&self) -> usize {
    self.users.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.users.read().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn alice() -> User {
    User::new("1", "Alice", "alice@example.com")
  }

  #[test]
  fn add_get_remove() {
    let manager = UserManager::new();
    manager.add_user(alice()).unwrap();
    assert_eq!(manager.get_user("1").unwrap(), alice());
    assert_eq!(manager.len(), 1);

    assert_eq!(manager.remove_user("1").unwrap(), alice());
    assert_eq!(manager.get_user("1"), Err(ChatError::UserNotFound("1".into())));
    assert_eq!(manager.remove_user("1"), Err(ChatError::UserNotFound("1".into())));
    assert!(manager.is_empty());
  }

  #[test]
  fn invalid_users_are_not_stored() {
    let manager = UserManager::new();
    let err = manager.add_user(User::new("1", "Alice", "nope")).unwrap_err();
    assert!(matches!(err, ChatError::InvalidUser(_)));
    assert!(manager.is_empty());
  }

  #[test]
  fn cancelled_manager_refuses_new_users() {
    let token = CancellationToken::new();
    let manager = UserManager::with_cancellation(token.clone());
    manager.add_user(alice()).unwrap();
    token.cancel();
    assert_eq!(
      manager.add_user(User::new("2", "Bob", "bob@example.com")),
      Err(ChatError::Cancelled)
    );
    // Reads and removals still work.
    assert_eq!(manager.list(), vec![alice()]);
    assert!(manager.remove_user("1").is_ok());
  }
}
