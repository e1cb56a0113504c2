//! User display name.

use crate::error::Result;
use crate::storage::{KeyValueStore, Persisted, USER_NAME_KEY};
use std::sync::Arc;
use thiserror::Error;

/// Name used until the user picks one.
pub const DEFAULT_USER_NAME: &str = "Guest";

/// Longest accepted display name, in characters.
pub const MAX_USER_NAME_CHARS: usize = 20;

/// Rejected name entry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is empty after trimming.
    #[error("name must not be empty")]
    Empty,

    /// Name is longer than allowed.
    #[error("name must be at most {max} characters")]
    TooLong {
        /// Maximum number of characters.
        max: usize,
    },
}

/// Trim and check a display name.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for blank input and
/// [`ValidationError::TooLong`] for names over [`MAX_USER_NAME_CHARS`].
pub fn validate_user_name(input: &str) -> std::result::Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    if trimmed.chars().count() > MAX_USER_NAME_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_USER_NAME_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Persisted user profile, independent of sessions.
#[derive(Debug)]
pub struct UserProfile {
    user_name: Persisted<Option<String>>,
}

impl UserProfile {
    /// Load the profile from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut user_name = Persisted::new(store, USER_NAME_KEY);
        user_name.load()?;
        Ok(Self { user_name })
    }

    /// The display name, `Guest` if none was chosen.
    #[must_use]
    pub fn user_name(&self) -> &str {
        self.user_name.get().as_deref().unwrap_or(DEFAULT_USER_NAME)
    }

    /// Whether the user still needs to pick a name.
    #[must_use]
    pub fn needs_name(&self) -> bool {
        self.user_name() == DEFAULT_USER_NAME
    }

    /// Validate and persist a new display name.
    ///
    /// Returns the stored (trimmed) name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for rejected input, or a storage
    /// error if the name cannot be written.
    pub fn set_user_name(&mut self, input: &str) -> Result<String> {
        let name = validate_user_name(input)?;
        self.user_name.set(Some(name.clone()))?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    #[test]
    fn validate_trims_input() {
        assert_eq!(validate_user_name("  まう  ").unwrap(), "まう");
    }

    #[test]
    fn validate_rejects_blank() {
        assert_eq!(validate_user_name("   "), Err(ValidationError::Empty));
        assert_eq!(validate_user_name(""), Err(ValidationError::Empty));
    }

    #[test]
    fn validate_counts_characters_not_bytes() {
        let twenty = "あ".repeat(20);
        assert_eq!(validate_user_name(&twenty).unwrap(), twenty);

        let twenty_one = "あ".repeat(21);
        assert_eq!(
            validate_user_name(&twenty_one),
            Err(ValidationError::TooLong { max: 20 })
        );
    }

    #[test]
    fn defaults_to_guest() {
        let profile = UserProfile::load(Arc::new(MemoryBackend::new())).unwrap();
        assert_eq!(profile.user_name(), "Guest");
        assert!(profile.needs_name());
    }

    #[test]
    fn loads_stored_name() {
        let store = MemoryBackend::with_entries([(USER_NAME_KEY, json!("りん"))]);
        let profile = UserProfile::load(Arc::new(store)).unwrap();
        assert_eq!(profile.user_name(), "りん");
        assert!(!profile.needs_name());
    }

    #[test]
    fn set_user_name_persists() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryBackend::new());
        let mut profile = UserProfile::load(Arc::clone(&store)).unwrap();

        let stored = profile.set_user_name(" ゆい ").unwrap();
        assert_eq!(stored, "ゆい");
        assert_eq!(store.get(USER_NAME_KEY).unwrap(), Some(json!("ゆい")));
    }

    #[test]
    fn set_user_name_rejects_invalid_and_keeps_old() {
        let mut profile = UserProfile::load(Arc::new(MemoryBackend::new())).unwrap();
        profile.set_user_name("ゆい").unwrap();

        let err = profile.set_user_name(&"x".repeat(30)).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::TooLong { .. })
        ));
        assert_eq!(profile.user_name(), "ゆい");
    }
}
