//! Persistence backends for chat state.

pub mod file;
pub mod memory;
pub mod persisted;
pub mod traits;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use persisted::Persisted;
pub use traits::KeyValueStore;

/// Key holding the array of sessions.
pub const SESSIONS_KEY: &str = "sessions";

/// Key holding the selected session id (string or null).
pub const CURRENT_SESSION_KEY: &str = "currentSessionId";

/// Key holding the user's display name.
pub const USER_NAME_KEY: &str = "userName";

/// Key of the single flat message list written by pre-session versions.
pub const LEGACY_MESSAGES_KEY: &str = "messages";
