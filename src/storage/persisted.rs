//! Typed, write-through view of a single storage key.

use crate::error::{Error, Result};
use crate::storage::traits::KeyValueStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// One persisted value with load-once and write-through semantics.
///
/// The value is read from the store at most once, by [`Persisted::load`].
/// After that the in-memory copy is authoritative: every mutation goes
/// through [`Persisted::update`] or [`Persisted::set`], which apply the
/// change to the current value and immediately write the result back.
pub struct Persisted<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    value: T,
    loaded: bool,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Create an unloaded view of `key` holding `T::default()`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            value: T::default(),
            loaded: false,
        }
    }

    /// Read the stored value, once.
    ///
    /// Returns `true` if a stored value was found and adopted. A stored
    /// document that cannot be decoded as `T` is logged and ignored, leaving
    /// the default in place. Calling `load` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    pub fn load(&mut self) -> Result<bool> {
        if self.loaded {
            return Ok(false);
        }

        let found = match self.store.get(self.key) {
            Ok(Some(raw)) => match serde_json::from_value::<T>(raw) {
                Ok(value) => {
                    self.value = value;
                    true
                }
                Err(e) => {
                    warn!(key = self.key, error = %e, "ignoring undecodable stored value");
                    false
                }
            },
            Ok(None) => false,
            Err(Error::Serde(e)) => {
                warn!(key = self.key, error = %e, "ignoring corrupt stored value");
                false
            }
            Err(e) => return Err(e),
        };

        self.loaded = true;
        debug!(key = self.key, found, "loaded persisted value");
        Ok(found)
    }

    /// Whether [`Persisted::load`] has completed.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The current in-memory value.
    #[must_use]
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the value and write it through.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or written.
    pub fn set(&mut self, value: T) -> Result<()> {
        self.value = value;
        self.flush()
    }

    /// Transform the current value in place and write it through.
    ///
    /// The in-memory value keeps the change even if the write fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or written.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let out = f(&mut self.value);
        self.flush()?;
        Ok(out)
    }

    fn flush(&self) -> Result<()> {
        let raw = serde_json::to_value(&self.value)?;
        self.store.set(self.key, &raw)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Persisted<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persisted")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("loaded", &self.loaded)
            .finish_non_exhaustive()
    }
}
