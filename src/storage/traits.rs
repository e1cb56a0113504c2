//! Storage trait definitions.

use crate::error::Result;
use serde_json::Value;
use std::fmt::Debug;

/// Durable key-value area holding JSON documents.
///
/// Keys are short logical names (`sessions`, `userName`, ...). Every `set`
/// replaces the whole value for its key.
pub trait KeyValueStore: Debug + Send + Sync {
    /// Get the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails or the stored
    /// document is not valid JSON.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn remove(&self, key: &str) -> Result<()>;
}
