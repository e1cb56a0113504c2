//! `mau delete` command implementation.

use crate::config::Config;
use crate::core::repository::SessionRepository;
use crate::error::Result;

/// Run the delete command.
///
/// Accepts a full session id or a unique prefix of one.
///
/// # Errors
///
/// Returns an error if the session is unknown or storage fails.
pub fn run(config: &Config, session_id: &str) -> Result<()> {
    let mut repo = SessionRepository::open(super::open_store(config)?)?;
    let session_id = super::resolve_session_id(&repo, session_id)?;
    let title = repo
        .session(&session_id)
        .map(|s| s.title.clone())
        .unwrap_or_default();

    repo.delete_session(&session_id)?;

    println!("Deleted session {session_id} ({title})");
    if let Some(current) = repo.current_session() {
        println!("Current session: {} ({})", current.id, current.title);
    }
    Ok(())
}
