//! Session and message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title a session carries until its first user message names it.
pub const PLACEHOLDER_TITLE: &str = "新しいチャット";

/// Title of the session built from a pre-session message list.
pub const LEGACY_TITLE: &str = "以前の会話";

/// Greeting seeded into every new session.
pub const WELCOME_TEXT: &str =
    "やほす〜！☀️\n今日も会いに来てくれてありがとう！なんかいいことあった？✨";

/// Maximum characters kept when deriving a title from a message.
pub const TITLE_MAX_CHARS: usize = 20;

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the client.
    User,
    /// The companion on the other end of the exchange.
    Ai,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique, time-ordered identifier.
    pub id: String,

    /// Author of the message.
    pub role: Role,

    /// Text revealed so far (the full text once streaming ends).
    pub text: String,

    /// True while a reveal is still writing into `text`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_streaming: bool,
}

impl Message {
    /// A user-authored message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(Role::User, text.into(), false)
    }

    /// A finished ai message.
    #[must_use]
    pub fn ai(text: impl Into<String>) -> Self {
        Self::with_role(Role::Ai, text.into(), false)
    }

    /// An empty ai message waiting for its text to be revealed.
    #[must_use]
    pub fn ai_placeholder() -> Self {
        Self::with_role(Role::Ai, String::new(), true)
    }

    fn with_role(role: Role, text: String, is_streaming: bool) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            text,
            is_streaming,
        }
    }
}

/// One independent conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session identifier.
    pub id: String,

    /// Display title; derived from the first user message once.
    pub title: String,

    /// Messages, oldest first.
    pub messages: Vec<Message>,

    /// When the session was created.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// When the session last changed. Strictly increases on every mutation.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a session seeded with the welcome greeting.
    #[must_use]
    pub fn new() -> Self {
        Self::with_messages(PLACEHOLDER_TITLE, vec![Message::ai(WELCOME_TEXT)])
    }

    /// Wrap a pre-session flat message list as a single session.
    #[must_use]
    pub fn from_legacy(messages: Vec<Message>) -> Self {
        Self::with_messages(LEGACY_TITLE, messages)
    }

    fn with_messages(title: &str, messages: Vec<Message>) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::now_v7().to_string(),
            title: title.to_string(),
            messages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the title still holds the placeholder default.
    #[must_use]
    pub fn has_placeholder_title(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }

    /// Replace the message sequence wholesale.
    ///
    /// Bumps `updated_at` and names the session after its first user message
    /// if it is still untitled and had at most one message before.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        let was_fresh = self.messages.len() <= 1;
        self.messages = messages;

        if was_fresh && self.has_placeholder_title() {
            if let Some(first) = self.messages.iter().find(|m| m.role == Role::User) {
                self.title = derive_title(&first.text);
            }
        }

        self.touch();
    }

    /// Look up a message by id.
    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Look up a message by id for mutation.
    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Advance `updated_at`, keeping it strictly increasing.
    pub fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a title from message text, truncating with `...`.
#[must_use]
pub fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// The current time at millisecond precision (the persisted resolution).
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

/// A timestamp that is "now" but never earlier than `prev + 1ms`.
#[must_use]
pub fn next_timestamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis();
    from_millis(now.max(prev.timestamp_millis() + 1))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
