//! `mau list` command implementation.

use crate::config::Config;
use crate::core::repository::SessionRepository;
use crate::core::state::{Role, Session};
use crate::error::Result;
use chrono::{DateTime, Local, Utc};

/// Default number of sessions to show.
const DEFAULT_LIMIT: usize = 20;

/// Maximum characters for the last-message preview.
const PREVIEW_CHARS: usize = 30;

/// Run the list command.
///
/// Shows sessions most recently updated first, marking the current one.
///
/// # Errors
///
/// Returns an error if the storage backend fails.
pub fn run(config: &Config, limit: Option<usize>) -> Result<()> {
    let repo = SessionRepository::open(super::open_store(config)?)?;
    print_sessions(&repo, limit.unwrap_or(DEFAULT_LIMIT));
    Ok(())
}

/// Print the session table.
pub(crate) fn print_sessions(repo: &SessionRepository, limit: usize) {
    let sessions = repo.sessions_by_recency();
    let current = repo.current_session_id();

    println!(
        "  {:<38} {:<17} {:<22} Last Message",
        "Session ID", "Updated", "Title"
    );
    println!("{}", "─".repeat(110));

    for session in sessions.iter().take(limit) {
        let marker = if current == Some(session.id.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {:<38} {:<17} {:<22} {}",
            session.id,
            format_local_time(session.updated_at),
            session.title,
            format_last_message(session),
        );
    }

    println!("{}", "─".repeat(110));
    println!(
        "Showing {} of {} session(s)",
        sessions.len().min(limit),
        sessions.len()
    );
}

/// Format UTC time as local time for display.
fn format_local_time(utc: DateTime<Utc>) -> String {
    let local: DateTime<Local> = utc.into();
    local.format("%Y-%m-%d %H:%M").to_string()
}

/// Preview of the last message, first line only.
fn format_last_message(session: &Session) -> String {
    let Some(message) = session.messages.last() else {
        return "(empty)".to_string();
    };

    let first_line = message.text.lines().next().unwrap_or_default();
    let speaker = match message.role {
        Role::User => "you",
        Role::Ai => "mau",
    };
    if first_line.chars().count() > PREVIEW_CHARS {
        let truncated: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{speaker}: {truncated}...")
    } else {
        format!("{speaker}: {first_line}")
    }
}
