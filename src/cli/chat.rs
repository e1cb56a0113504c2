//! `mau chat` command: the interactive chat loop.

use crate::chat::{
    APOLOGY_TEXT, ChatOrchestrator, HttpExchangeClient, RevealScheduler, SendOutcome,
};
use crate::config::Config;
use crate::core::profile::UserProfile;
use crate::core::repository::SessionRepository;
use crate::core::state::{Message, Role};
use crate::error::{Error, Result};
use crate::link::{LinkPreviewClient, display_domain, extract_urls};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;

const HELP: &str = "\
/new             start a new chat
/list            list chats
/switch <id>     switch to a chat (id or unique prefix)
/delete <id>     delete a chat
/unsend          delete your last message in this chat
/name <name>     change your name
/quit            leave";

/// A slash command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    New,
    List,
    Switch(String),
    Delete(String),
    Unsend,
    Name(String),
    Help,
    Quit,
    Invalid(String),
}

impl ReplCommand {
    /// Parse a prompt line. Lines not starting with `/` are chat input.
    fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix('/')?;
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(name, arg)| (name, arg.trim()));

        let command = match (name, arg) {
            ("new", _) => Self::New,
            ("list" | "ls", _) => Self::List,
            ("switch" | "sw", id) if !id.is_empty() => Self::Switch(id.to_string()),
            ("delete" | "rm", id) if !id.is_empty() => Self::Delete(id.to_string()),
            ("unsend", _) => Self::Unsend,
            ("name", name) if !name.is_empty() => Self::Name(name.to_string()),
            ("help" | "?", _) => Self::Help,
            ("quit" | "exit" | "q", _) => Self::Quit,
            _ => Self::Invalid(rest.to_string()),
        };
        Some(command)
    }
}

/// Run the chat command.
///
/// # Errors
///
/// Returns an error if storage cannot be opened or the terminal fails.
pub fn run(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| Error::InvalidState(format!("failed to start async runtime: {e}")))?;
    runtime.block_on(repl(config))
}

async fn repl(config: &Config) -> Result<()> {
    let store = super::open_store(config)?;
    let repo = SessionRepository::open(Arc::clone(&store))?.into_shared();
    let mut profile = UserProfile::load(store)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if profile.needs_name() && !ask_name(&mut profile, &mut lines).await? {
        return Ok(());
    }

    let client = Arc::new(HttpExchangeClient::new(
        config.api.base_url.clone(),
        config.api.request_timeout(),
    ));
    let tick = config.stream.tick();
    let orchestrator = ChatOrchestrator::new(
        repo,
        profile,
        client,
        RevealScheduler::new(tick),
        config.chat.resolve_timezone(),
    )
    .with_history_limit(config.api.history_limit);
    let previews = LinkPreviewClient::new(config.api.base_url.clone(), config.api.request_timeout());

    show_current_session(&orchestrator).await;
    println!("(/help for commands)");

    loop {
        prompt(&format!("{}> ", orchestrator.user_name().await))?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ReplCommand::parse(&line) {
            Some(ReplCommand::Quit) => break,
            Some(command) => {
                if let Err(e) = handle_command(&orchestrator, command).await {
                    eprintln!("mau: {e}");
                }
            }
            None => send(&orchestrator, &previews, tick, &line).await?,
        }
    }

    println!("またね〜！👋");
    Ok(())
}

/// Ask for a display name until one is accepted. Returns false on EOF.
async fn ask_name(profile: &mut UserProfile, lines: &mut Lines<BufReader<Stdin>>) -> Result<bool> {
    println!("はじめまして！なんて呼べばいい？");
    loop {
        prompt("name> ")?;
        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        match profile.set_user_name(&line) {
            Ok(name) => {
                println!("よろしくね、{name}！");
                return Ok(true);
            }
            Err(Error::Validation(e)) => println!("{e}"),
            Err(e) => return Err(e),
        }
    }
}

async fn handle_command(orchestrator: &ChatOrchestrator, command: ReplCommand) -> Result<()> {
    match command {
        ReplCommand::New => {
            orchestrator.create_session().await?;
            show_current_session(orchestrator).await;
        }
        ReplCommand::List => {
            let repo = orchestrator.repository().lock().await;
            super::list::print_sessions(&repo, usize::MAX);
        }
        ReplCommand::Switch(prefix) => {
            let session_id = {
                let repo = orchestrator.repository().lock().await;
                super::resolve_session_id(&repo, &prefix)?
            };
            orchestrator.select_session(&session_id).await?;
            show_current_session(orchestrator).await;
        }
        ReplCommand::Delete(prefix) => {
            let session_id = {
                let repo = orchestrator.repository().lock().await;
                super::resolve_session_id(&repo, &prefix)?
            };
            orchestrator.delete_session(&session_id).await?;
            println!("Deleted session {session_id}");
            show_current_session(orchestrator).await;
        }
        ReplCommand::Unsend => unsend_last(orchestrator).await?,
        ReplCommand::Name(name) => {
            let stored = orchestrator.set_user_name(&name).await?;
            println!("Name set to {stored}");
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Invalid(input) => println!("Unknown command: /{input} (try /help)"),
        ReplCommand::Quit => {}
    }
    Ok(())
}

async fn unsend_last(orchestrator: &ChatOrchestrator) -> Result<()> {
    let target = {
        let repo = orchestrator.repository().lock().await;
        repo.current_session().and_then(|session| {
            session
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| (session.id.clone(), m.id.clone(), m.text.clone()))
        })
    };

    match target {
        Some((session_id, message_id, text)) => {
            orchestrator.delete_message(&session_id, &message_id).await?;
            println!("Deleted: {text}");
        }
        None => println!("Nothing to delete."),
    }
    Ok(())
}

async fn send(
    orchestrator: &ChatOrchestrator,
    previews: &LinkPreviewClient,
    tick: Duration,
    text: &str,
) -> Result<()> {
    let current = orchestrator
        .repository()
        .lock()
        .await
        .current_session_id()
        .map(str::to_string);
    let Some(session_id) = current else {
        return Ok(());
    };

    match orchestrator.send(&session_id, text).await? {
        SendOutcome::EmptyText => {}
        SendOutcome::Busy => println!("(まだお返事中だよ…)"),
        SendOutcome::SessionMissing => println!("(this chat no longer exists)"),
        SendOutcome::Failed => println!("mau: {APOLOGY_TEXT}"),
        SendOutcome::Revealing { message_id } => {
            let reply = follow_reveal(orchestrator, &session_id, &message_id, tick).await?;
            if let Some(mode) = orchestrator.current_mode() {
                println!("{}", format_mode(&mode));
            }
            show_link_previews(previews, &reply).await;
        }
    }
    Ok(())
}

/// Print a reply as it is revealed. Returns the final text.
async fn follow_reveal(
    orchestrator: &ChatOrchestrator,
    session_id: &str,
    message_id: &str,
    tick: Duration,
) -> Result<String> {
    let mut stdout = std::io::stdout();
    write!(stdout, "mau: ")?;
    stdout.flush()?;

    let mut shown = 0;
    let mut interval = tokio::time::interval(tick);
    let text = loop {
        interval.tick().await;
        let (text, streaming) = {
            let repo = orchestrator.repository().lock().await;
            repo.session(session_id)
                .and_then(|s| s.message(message_id))
                .map_or((String::new(), false), |m| (m.text.clone(), m.is_streaming))
        };

        let fresh: String = text.chars().skip(shown).collect();
        shown += fresh.chars().count();
        write!(stdout, "{fresh}")?;
        stdout.flush()?;

        if !streaming {
            writeln!(stdout)?;
            break text;
        }
    };

    // The gate reopens right after the final tick lands
    while orchestrator.is_awaiting_response() {
        interval.tick().await;
    }
    Ok(text)
}

async fn show_link_previews(previews: &LinkPreviewClient, text: &str) {
    for url in extract_urls(text) {
        let domain = display_domain(&url);
        match previews.fetch(&url).await {
            Ok(preview) => {
                let title = preview.title.unwrap_or_else(|| url.clone());
                println!("  🔗 {domain} | {title}");
                if let Some(description) = preview.description {
                    println!("     {description}");
                }
            }
            Err(e) => {
                debug!(%url, error = %e, "link preview unavailable");
                println!("  🔗 {domain}");
            }
        }
    }
}

async fn show_current_session(orchestrator: &ChatOrchestrator) {
    let repo = orchestrator.repository().lock().await;
    let Some(session) = repo.current_session() else {
        return;
    };

    println!("── {} ({}) ──", session.title, session.id);
    for message in &session.messages {
        println!("{}", format_message(message));
    }
}

fn format_message(message: &Message) -> String {
    let speaker = match message.role {
        Role::User => "you",
        Role::Ai => "mau",
    };
    format!("{speaker}: {}", message.text)
}

fn format_mode(mode: &str) -> String {
    format!("  [mode: {mode}]")
}

fn prompt(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(ReplCommand::parse("やほー"), None);
        assert_eq!(ReplCommand::parse("  hello /new"), None);
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(ReplCommand::parse("/new"), Some(ReplCommand::New));
        assert_eq!(
            ReplCommand::parse("/switch 0192abc"),
            Some(ReplCommand::Switch("0192abc".to_string()))
        );
        assert_eq!(
            ReplCommand::parse("  /name   まう  "),
            Some(ReplCommand::Name("まう".to_string()))
        );
        assert_eq!(ReplCommand::parse("/q"), Some(ReplCommand::Quit));
    }

    #[test]
    fn missing_argument_is_invalid() {
        assert_eq!(
            ReplCommand::parse("/switch"),
            Some(ReplCommand::Invalid("switch".to_string()))
        );
        assert_eq!(
            ReplCommand::parse("/frobnicate now"),
            Some(ReplCommand::Invalid("frobnicate now".to_string()))
        );
    }

    #[test]
    fn reply_mode_is_shown_under_reply() {
        assert_eq!(format_mode("MAIN"), "  [mode: MAIN]");
    }

    #[test]
    fn formats_messages_by_speaker() {
        assert_eq!(format_message(&Message::user("hi")), "you: hi");
        assert_eq!(format_message(&Message::ai("やほー")), "mau: やほー");
    }
}
