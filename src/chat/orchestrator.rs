//! Chat orchestration: user input, remote exchange, and reveal of the reply.

use crate::chat::exchange::{ExchangeClient, ExchangeRequest, recent_history};
use crate::chat::reveal::{RevealOutcome, RevealScheduler};
use crate::core::profile::UserProfile;
use crate::core::repository::SharedRepository;
use crate::core::state::Message;
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Reply shown when an exchange fails.
pub const APOLOGY_TEXT: &str =
    "ごめんね、うまくお返事できなかったみたい…🙏\nもう一回送ってくれるとうれしいな！";

/// Default number of prior messages sent as context.
pub const DEFAULT_HISTORY_LIMIT: usize = 12;

/// Process-wide UI state owned by the orchestrator. Not persisted.
#[derive(Debug, Default)]
pub struct AppState {
    awaiting_response: AtomicBool,
    current_mode: Mutex<Option<String>>,
}

impl AppState {
    /// Whether an exchange (including its reveal) is in progress.
    #[must_use]
    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response.load(Ordering::SeqCst)
    }

    /// Last operating mode reported by the remote side.
    #[must_use]
    pub fn current_mode(&self) -> Option<String> {
        self.current_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn try_begin(&self) -> bool {
        self.awaiting_response
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        self.awaiting_response.store(false, Ordering::SeqCst);
    }

    fn record_mode(&self, mode: String) {
        *self
            .current_mode
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(mode);
    }
}

/// What a call to [`ChatOrchestrator::send`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Input was blank; nothing happened.
    EmptyText,
    /// Another exchange is in flight; nothing happened.
    Busy,
    /// The target session does not exist (or vanished mid-exchange).
    SessionMissing,
    /// The reply is being revealed into `message_id`.
    Revealing {
        /// Id of the streaming ai message.
        message_id: String,
    },
    /// The exchange failed and the apology message was appended.
    Failed,
}

/// Coordinates sends against the repository, remote endpoint, and reveals.
#[derive(Clone)]
pub struct ChatOrchestrator {
    repo: SharedRepository,
    profile: Arc<tokio::sync::Mutex<UserProfile>>,
    client: Arc<dyn ExchangeClient>,
    reveals: RevealScheduler,
    state: Arc<AppState>,
    history_limit: usize,
    timezone: String,
}

impl ChatOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        repo: SharedRepository,
        profile: UserProfile,
        client: Arc<dyn ExchangeClient>,
        reveals: RevealScheduler,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            profile: Arc::new(tokio::sync::Mutex::new(profile)),
            client,
            reveals,
            state: Arc::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            timezone: timezone.into(),
        }
    }

    /// Override how many prior messages are sent as context.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// The shared session repository.
    #[must_use]
    pub fn repository(&self) -> &SharedRepository {
        &self.repo
    }

    /// Process-wide UI state.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Whether an exchange (including its reveal) is in progress.
    #[must_use]
    pub fn is_awaiting_response(&self) -> bool {
        self.state.is_awaiting_response()
    }

    /// Last operating mode reported by the remote side.
    #[must_use]
    pub fn current_mode(&self) -> Option<String> {
        self.state.current_mode()
    }

    /// The user's display name.
    pub async fn user_name(&self) -> String {
        self.profile.lock().await.user_name().to_string()
    }

    /// Validate and store a new display name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for rejected input.
    pub async fn set_user_name(&self, input: &str) -> Result<String> {
        self.profile.lock().await.set_user_name(input)
    }

    /// Send `text` in `session_id`.
    ///
    /// Only one exchange runs at a time: while one is awaiting its reply or
    /// revealing it, further sends return [`SendOutcome::Busy`] without
    /// touching anything. On success the reply is revealed in the background
    /// and the gate reopens once the reveal ends.
    ///
    /// # Errors
    ///
    /// Returns an error only if the user message cannot be written; exchange
    /// failures are recovered with the apology message.
    pub async fn send(&self, session_id: &str, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::EmptyText);
        }
        if !self.state.try_begin() {
            debug!(%session_id, "send ignored while awaiting a response");
            return Ok(SendOutcome::Busy);
        }

        let outcome = self.exchange(session_id, text).await;
        let keep_gate = matches!(outcome, Ok(SendOutcome::Revealing { .. }));
        if !keep_gate {
            self.state.finish();
        }
        outcome
    }

    async fn exchange(&self, session_id: &str, text: &str) -> Result<SendOutcome> {
        let history = {
            let mut repo = self.repo.lock().await;
            let Some(session) = repo.session(session_id) else {
                return Ok(SendOutcome::SessionMissing);
            };
            let history = recent_history(&session.messages, self.history_limit);
            let mut messages = session.messages.clone();
            messages.push(Message::user(text));
            repo.append_messages(session_id, messages)?;
            history
        };

        let request = ExchangeRequest {
            text: text.to_string(),
            user_name: self.user_name().await,
            history,
            timezone: self.timezone.clone(),
        };

        match self.client.exchange(&request).await {
            Ok(response) => {
                if let Some(mode) = response.mode {
                    self.state.record_mode(mode);
                }
                self.begin_reveal(session_id, &response.response).await
            }
            Err(e) => {
                warn!(%session_id, error = %e, "chat exchange failed");
                let mut repo = self.repo.lock().await;
                let Some(session) = repo.session(session_id) else {
                    return Ok(SendOutcome::SessionMissing);
                };
                let mut messages = session.messages.clone();
                messages.push(Message::ai(APOLOGY_TEXT));
                repo.append_messages(session_id, messages)?;
                Ok(SendOutcome::Failed)
            }
        }
    }

    async fn begin_reveal(&self, session_id: &str, reply: &str) -> Result<SendOutcome> {
        let placeholder = Message::ai_placeholder();
        let message_id = placeholder.id.clone();

        {
            let mut repo = self.repo.lock().await;
            let Some(session) = repo.session(session_id) else {
                debug!(%session_id, "session deleted before the reply arrived");
                return Ok(SendOutcome::SessionMissing);
            };
            let mut messages = session.messages.clone();
            messages.push(placeholder);
            repo.append_messages(session_id, messages)?;
        }

        let state = Arc::clone(&self.state);
        self.reveals.start(
            Arc::clone(&self.repo),
            session_id.to_string(),
            message_id.clone(),
            reply,
            move |outcome| {
                if outcome != RevealOutcome::Completed {
                    debug!(?outcome, "reveal ended early");
                }
                state.finish();
            },
        );

        info!(%session_id, %message_id, "revealing reply");
        Ok(SendOutcome::Revealing { message_id })
    }

    /// Create a session and select it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the session cannot be written.
    pub async fn create_session(&self) -> Result<String> {
        Ok(self.repo.lock().await.create_session()?.id)
    }

    /// Select a session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SessionNotFound`] for unknown ids.
    pub async fn select_session(&self, session_id: &str) -> Result<()> {
        self.repo.lock().await.select_session(session_id)
    }

    /// Delete a session, cancelling any reveal still writing into it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the change cannot be written.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let cancelled = self.reveals.cancel_session(session_id);
        if cancelled > 0 {
            debug!(%session_id, cancelled, "cancelled reveals of deleted session");
        }
        self.repo.lock().await.delete_session(session_id)
    }

    /// Delete a user-authored message.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidState`] for ai messages.
    pub async fn delete_message(&self, session_id: &str, message_id: &str) -> Result<bool> {
        self.repo.lock().await.delete_message(session_id, message_id)
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("state", &self.state)
            .field("history_limit", &self.history_limit)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}
