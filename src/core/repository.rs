//! Session repository: the collection of sessions, the current-session
//! pointer, and the one-time migration of pre-session history.
//!
//! The repository is synchronous. Async callers share it through
//! [`SharedRepository`], so every mutation runs against the latest committed
//! state while holding the lock, and is written through before the lock is
//! released.

use crate::core::state::{Message, Role, Session};
use crate::error::{Error, Result};
use crate::storage::{
    CURRENT_SESSION_KEY, KeyValueStore, LEGACY_MESSAGES_KEY, Persisted, SESSIONS_KEY,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Repository handle shared between the orchestrator and reveal tasks.
pub type SharedRepository = Arc<Mutex<SessionRepository>>;

/// Loading state of the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Nothing read from storage yet.
    Unloaded,
    /// Reading from storage.
    Loading,
    /// Loaded; operations are allowed.
    Ready,
}

/// Result of [`SessionRepository::migrate_legacy_if_needed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Sessions already existed; nothing was done.
    Skipped,
    /// Legacy messages were wrapped into a new session.
    Migrated {
        /// Id of the session holding the legacy messages.
        session_id: String,
        /// Number of messages carried over.
        message_count: usize,
    },
    /// No usable legacy data; a fresh session was created.
    Created {
        /// Id of the new session.
        session_id: String,
    },
}

/// Owner of all chat sessions.
#[derive(Debug)]
pub struct SessionRepository {
    store: Arc<dyn KeyValueStore>,
    sessions: Persisted<Vec<Session>>,
    current: Persisted<Option<String>>,
    readiness: Readiness,
}

impl SessionRepository {
    /// Create an unloaded repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sessions: Persisted::new(Arc::clone(&store), SESSIONS_KEY),
            current: Persisted::new(Arc::clone(&store), CURRENT_SESSION_KEY),
            store,
            readiness: Readiness::Unloaded,
        }
    }

    /// Create and load a repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut repo = Self::new(store);
        repo.load()?;
        Ok(repo)
    }

    /// Wrap the repository for sharing across tasks.
    #[must_use]
    pub fn into_shared(self) -> SharedRepository {
        Arc::new(Mutex::new(self))
    }

    /// Current loading state.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Load persisted state and enter `Ready`.
    ///
    /// Entering `Ready` runs the legacy migration check exactly once and
    /// repairs a missing or stale current-session pointer. Calling `load`
    /// on a ready repository does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written. A failed
    /// read leaves the repository `Unloaded`.
    pub fn load(&mut self) -> Result<()> {
        match self.readiness {
            Readiness::Ready => return Ok(()),
            Readiness::Loading => {
                return Err(Error::InvalidState("repository is already loading".into()));
            }
            Readiness::Unloaded => {}
        }

        self.readiness = Readiness::Loading;
        if let Err(e) = self.sessions.load().and_then(|_| self.current.load()) {
            self.readiness = Readiness::Unloaded;
            return Err(e);
        }

        self.readiness = Readiness::Ready;
        info!(sessions = self.sessions.get().len(), "session repository ready");

        self.clear_stale_streaming()?;
        self.migrate_legacy_if_needed()?;
        self.heal_current_pointer()
    }

    /// Seed the collection when it is empty.
    ///
    /// A flat message array under the legacy key becomes one session titled
    /// as the previous conversation. Missing or malformed legacy data yields
    /// a fresh session instead. Once any session exists this is a no-op,
    /// even if the legacy key is still present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before loading, or a storage error if the
    /// new session cannot be written.
    pub fn migrate_legacy_if_needed(&mut self) -> Result<MigrationOutcome> {
        self.ensure_ready()?;
        if !self.sessions.get().is_empty() {
            return Ok(MigrationOutcome::Skipped);
        }

        match self.read_legacy() {
            Ok(Some(messages)) => {
                let message_count = messages.len();
                let session = Session::from_legacy(messages);
                let session_id = session.id.clone();
                self.sessions.update(|all| all.insert(0, session))?;
                self.current.set(Some(session_id.clone()))?;
                info!(%session_id, message_count, "migrated legacy messages");
                Ok(MigrationOutcome::Migrated {
                    session_id,
                    message_count,
                })
            }
            Ok(None) => {
                let session = self.create_session()?;
                Ok(MigrationOutcome::Created {
                    session_id: session.id,
                })
            }
            Err(e) => {
                warn!(error = %e, "discarding legacy messages");
                let session = self.create_session()?;
                Ok(MigrationOutcome::Created {
                    session_id: session.id,
                })
            }
        }
    }

    fn read_legacy(&self) -> Result<Option<Vec<Message>>> {
        let raw = match self.store.get(LEGACY_MESSAGES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => return Err(Error::MalformedLegacyData(e.to_string())),
        };

        if !matches!(raw, Value::Array(_)) {
            return Err(Error::MalformedLegacyData("expected a message array".into()));
        }

        let mut messages: Vec<Message> = serde_json::from_value(raw)
            .map_err(|e| Error::MalformedLegacyData(e.to_string()))?;
        for message in &mut messages {
            message.is_streaming = false;
        }
        Ok(Some(messages))
    }

    /// Create a session, put it first, and select it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before loading, or a storage error.
    pub fn create_session(&mut self) -> Result<Session> {
        self.ensure_ready()?;
        let session = Session::new();
        self.sessions.update(|all| all.insert(0, session.clone()))?;
        self.current.set(Some(session.id.clone()))?;
        info!(session_id = %session.id, "created session");
        Ok(session)
    }

    /// Make `session_id` the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if no such session exists.
    pub fn select_session(&mut self, session_id: &str) -> Result<()> {
        self.ensure_ready()?;
        if self.session(session_id).is_none() {
            return Err(Error::SessionNotFound(session_id.to_string()));
        }
        self.current.set(Some(session_id.to_string()))
    }

    /// Delete a session.
    ///
    /// Deleting the current session selects the most recently updated
    /// survivor, or creates a replacement if none remain. Unknown ids are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before loading, or a storage error.
    pub fn delete_session(&mut self, session_id: &str) -> Result<()> {
        self.ensure_ready()?;
        let Some(index) = self.position(session_id) else {
            debug!(%session_id, "delete of unknown session ignored");
            return Ok(());
        };

        self.sessions.update(|all| {
            all.remove(index);
        })?;
        info!(%session_id, "deleted session");

        if self.current_session_id() != Some(session_id) {
            return Ok(());
        }

        match self.most_recent_id() {
            Some(next) => self.current.set(Some(next)),
            None => self.create_session().map(|_| ()),
        }
    }

    /// Replace a session's messages wholesale.
    ///
    /// Bumps `updated_at` and applies the one-time title derivation. Returns
    /// `false` without touching anything if the session no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before loading, or a storage error.
    pub fn append_messages(&mut self, session_id: &str, messages: Vec<Message>) -> Result<bool> {
        self.ensure_ready()?;
        let Some(index) = self.position(session_id) else {
            debug!(%session_id, "append to missing session ignored");
            return Ok(false);
        };
        self.sessions
            .update(|all| all[index].replace_messages(messages))?;
        Ok(true)
    }

    /// Apply `edit` to a message that is still streaming.
    ///
    /// Only the targeted message in the targeted session changes; the
    /// session's `updated_at` is bumped. Returns `false` if the session or
    /// message is gone, or the message has already finished streaming.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] before loading, or a storage error.
    pub fn update_streaming_message(
        &mut self,
        session_id: &str,
        message_id: &str,
        edit: impl FnOnce(&mut Message),
    ) -> Result<bool> {
        self.ensure_ready()?;
        let Some(index) = self.position(session_id) else {
            return Ok(false);
        };
        let streaming = self.sessions.get()[index]
            .message(message_id)
            .is_some_and(|m| m.is_streaming);
        if !streaming {
            return Ok(false);
        }

        self.sessions.update(|all| {
            let session = &mut all[index];
            if let Some(message) = session.message_mut(message_id) {
                edit(message);
            }
            session.touch();
        })?;
        Ok(true)
    }

    /// Delete a user-authored message.
    ///
    /// Returns `false` if the session or message does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for ai messages, [`Error::NotReady`]
    /// before loading, or a storage error.
    pub fn delete_message(&mut self, session_id: &str, message_id: &str) -> Result<bool> {
        self.ensure_ready()?;
        let Some(index) = self.position(session_id) else {
            return Ok(false);
        };
        match self.sessions.get()[index].message(message_id) {
            None => return Ok(false),
            Some(message) if message.role != Role::User => {
                return Err(Error::InvalidState(format!(
                    "only user messages can be deleted (message {message_id})"
                )));
            }
            Some(_) => {}
        }

        self.sessions.update(|all| {
            let session = &mut all[index];
            session.messages.retain(|m| m.id != message_id);
            session.touch();
        })?;
        debug!(%session_id, %message_id, "deleted message");
        Ok(true)
    }

    /// All sessions in persisted order (newest created first).
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        self.sessions.get()
    }

    /// Sessions ordered by `updated_at`, most recent first.
    #[must_use]
    pub fn sessions_by_recency(&self) -> Vec<&Session> {
        let mut sorted: Vec<&Session> = self.sessions.get().iter().collect();
        sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sorted
    }

    /// Look up a session by id.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get().iter().find(|s| s.id == session_id)
    }

    /// Id of the current session.
    #[must_use]
    pub fn current_session_id(&self) -> Option<&str> {
        self.current.get().as_deref()
    }

    /// The current session.
    #[must_use]
    pub fn current_session(&self) -> Option<&Session> {
        self.current_session_id().and_then(|id| self.session(id))
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.readiness == Readiness::Ready {
            Ok(())
        } else {
            Err(Error::NotReady(self.readiness))
        }
    }

    fn position(&self, session_id: &str) -> Option<usize> {
        self.sessions.get().iter().position(|s| s.id == session_id)
    }

    fn most_recent_id(&self) -> Option<String> {
        self.sessions
            .get()
            .iter()
            .max_by_key(|s| s.updated_at)
            .map(|s| s.id.clone())
    }

    /// A reveal interrupted by shutdown can never resume; finish it as-is.
    fn clear_stale_streaming(&mut self) -> Result<()> {
        let stale = self
            .sessions
            .get()
            .iter()
            .flat_map(|s| &s.messages)
            .any(|m| m.is_streaming);
        if !stale {
            return Ok(());
        }

        warn!("clearing streaming flags left over from a previous run");
        self.sessions.update(|all| {
            for message in all.iter_mut().flat_map(|s| s.messages.iter_mut()) {
                message.is_streaming = false;
            }
        })
    }

    fn heal_current_pointer(&mut self) -> Result<()> {
        let valid = self
            .current_session_id()
            .is_some_and(|id| self.session(id).is_some());
        if valid || self.sessions.get().is_empty() {
            return Ok(());
        }
        let elected = self.most_recent_id();
        debug!(session_id = ?elected, "repairing current session pointer");
        self.current.set(elected)
    }
}
