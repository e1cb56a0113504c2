//! CLI command implementations.

pub mod chat;
pub mod delete;
pub mod list;
pub mod name;

use crate::config::Config;
use crate::core::repository::SessionRepository;
use crate::error::{Error, Result};
use crate::storage::{FileBackend, KeyValueStore};
use std::sync::Arc;

/// Open the file store at the configured path.
fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    Ok(Arc::new(FileBackend::new(config.storage.path.clone())?))
}

/// Resolve a full session id from an id or unique id prefix.
fn resolve_session_id(repo: &SessionRepository, input: &str) -> Result<String> {
    let input = input.trim();
    if repo.session(input).is_some() {
        return Ok(input.to_string());
    }

    let matches: Vec<&str> = repo
        .sessions()
        .iter()
        .map(|s| s.id.as_str())
        .filter(|id| !input.is_empty() && id.starts_with(input))
        .collect();

    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => Err(Error::SessionNotFound(input.to_string())),
        _ => Err(Error::InvalidState(format!(
            "session prefix '{input}' is ambiguous ({} matches)",
            matches.len()
        ))),
    }
}
