//! File-based storage backend.

use crate::error::{Error, Result};
use crate::storage::traits::KeyValueStore;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;

/// File-based key-value backend with atomic writes.
///
/// Each key is stored as `<base_dir>/store/<key>.json`.
#[derive(Debug)]
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    /// Create a new file backend.
    ///
    /// Creates the store directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be created.
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(base_dir.join("store"))?;
        Ok(Self { base_dir })
    }

    /// Get the path to a key's file.
    fn key_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_dir.join("store").join(format!("{key}.json")))
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidState(format!("invalid storage key: {key:?}")))
    }
}

impl KeyValueStore for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let value: Value = serde_json::from_str(&contents)?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.key_path(key)?;
        let temp = path.with_extension("tmp");

        // Write to temp file first
        let contents = serde_json::to_string_pretty(value)?;
        fs::write(&temp, &contents)?;

        // Atomic rename - readers never observe a half-written document
        fs::rename(&temp, &path)?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

/// Get the default mau home directory.
///
/// Uses `MAU_HOME` environment variable if set, otherwise `~/.mau`.
#[must_use]
pub fn get_mau_home() -> PathBuf {
    if let Ok(home) = std::env::var("MAU_HOME") {
        PathBuf::from(home)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".mau")
    } else {
        PathBuf::from(".mau")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_backend() -> (FileBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path().to_path_buf()).unwrap();
        (backend, temp_dir)
    }

    #[test]
    fn creates_store_directory() {
        let temp_dir = TempDir::new().unwrap();
        let _backend = FileBackend::new(temp_dir.path().to_path_buf()).unwrap();
        assert!(temp_dir.path().join("store").exists());
    }

    #[test]
    fn get_missing_key() {
        let (store, _temp) = create_test_backend();
        assert!(store.get("sessions").unwrap().is_none());
    }

    #[test]
    fn set_and_get_value() {
        let (store, _temp) = create_test_backend();
        store.set("userName", &json!("まう")).unwrap();

        let value = store.get("userName").unwrap().unwrap();
        assert_eq!(value, json!("まう"));
    }

    #[test]
    fn set_replaces_previous_value() {
        let (store, _temp) = create_test_backend();
        store.set("currentSessionId", &json!("a")).unwrap();
        store.set("currentSessionId", &json!(null)).unwrap();

        assert_eq!(store.get("currentSessionId").unwrap(), Some(json!(null)));
    }

    #[test]
    fn atomic_write_creates_no_temp_file() {
        let (store, temp_dir) = create_test_backend();
        store.set("sessions", &json!([])).unwrap();

        let temp_path = temp_dir.path().join("store").join("sessions.tmp");
        assert!(!temp_path.exists());

        let main_path = temp_dir.path().join("store").join("sessions.json");
        assert!(main_path.exists());
    }

    #[test]
    fn remove_deletes_file() {
        let (store, temp_dir) = create_test_backend();
        store.set("messages", &json!([])).unwrap();

        let path = temp_dir.path().join("store").join("messages.json");
        assert!(path.exists());

        store.remove("messages").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn remove_missing_key_succeeds() {
        let (store, _temp) = create_test_backend();
        store.remove("nonexistent").unwrap();
    }

    #[test]
    fn get_corrupted_file_returns_error() {
        let (store, temp_dir) = create_test_backend();
        let path = temp_dir.path().join("store").join("sessions.json");
        fs::write(&path, "{ this is not valid json }").unwrap();

        assert!(store.get("sessions").is_err());
    }

    #[test]
    fn rejects_path_like_keys() {
        let (store, _temp) = create_test_backend();
        assert!(store.get("../escape").is_err());
        assert!(store.set("a/b", &json!(1)).is_err());
        assert!(store.remove("").is_err());
    }

    #[test]
    fn values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileBackend::new(temp_dir.path().to_path_buf()).unwrap();
            store.set("userName", &json!("Mau")).unwrap();
        }
        let store = FileBackend::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(store.get("userName").unwrap(), Some(json!("Mau")));
    }
}
