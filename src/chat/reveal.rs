//! Simulated streaming: reveal a known reply one character per tick.
//!
//! Each reveal runs as its own task, registered under the message id with a
//! cancellation token. Every tick locks the shared repository and edits only
//! the targeted message, so concurrent changes elsewhere are never
//! overwritten by a stale copy.

use crate::core::repository::SharedRepository;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How a reveal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// Full text shown and the message marked finished.
    Completed,
    /// The session or message disappeared mid-reveal.
    Abandoned,
    /// Cancelled through the scheduler.
    Cancelled,
}

#[derive(Debug)]
struct RevealTask {
    session_id: String,
    generation: u64,
    token: CancellationToken,
}

type TaskMap = Arc<Mutex<HashMap<String, RevealTask>>>;

/// Runs and tracks reveal tasks.
#[derive(Debug, Clone)]
pub struct RevealScheduler {
    tick: Duration,
    tasks: TaskMap,
    generation: Arc<AtomicU64>,
}

impl RevealScheduler {
    /// Create a scheduler revealing one character every `tick`.
    #[must_use]
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            tasks: Arc::default(),
            generation: Arc::default(),
        }
    }

    /// Interval between revealed characters.
    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Start revealing `full_text` into a streaming message.
    ///
    /// `on_finish` runs exactly once with the outcome. A reveal already
    /// running for the same message is cancelled first.
    pub fn start<F>(
        &self,
        repo: SharedRepository,
        session_id: String,
        message_id: String,
        full_text: &str,
        on_finish: F,
    ) -> JoinHandle<RevealOutcome>
    where
        F: FnOnce(RevealOutcome) + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let previous = lock(&self.tasks).insert(
            message_id.clone(),
            RevealTask {
                session_id: session_id.clone(),
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let chars: Vec<char> = full_text.chars().collect();
        let tick = self.tick;
        let tasks = Arc::clone(&self.tasks);

        tokio::spawn(async move {
            debug!(%session_id, %message_id, chars = chars.len(), "reveal started");
            let outcome = run_reveal(&repo, &session_id, &message_id, &chars, tick, &token).await;

            {
                let mut tasks = lock(&tasks);
                if tasks
                    .get(&message_id)
                    .is_some_and(|t| t.generation == generation)
                {
                    tasks.remove(&message_id);
                }
            }

            debug!(%session_id, %message_id, ?outcome, "reveal finished");
            on_finish(outcome);
            outcome
        })
    }

    /// Cancel the reveal of one message. Returns whether one was running.
    pub fn cancel(&self, message_id: &str) -> bool {
        match lock(&self.tasks).remove(message_id) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every reveal writing into `session_id`. Returns how many.
    pub fn cancel_session(&self, session_id: &str) -> usize {
        let mut tasks = lock(&self.tasks);
        let ids: Vec<String> = tasks
            .iter()
            .filter(|(_, t)| t.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            if let Some(task) = tasks.remove(id) {
                task.token.cancel();
            }
        }
        ids.len()
    }

    /// Whether a reveal is running for `message_id`.
    #[must_use]
    pub fn is_active(&self, message_id: &str) -> bool {
        lock(&self.tasks).contains_key(message_id)
    }

    /// Number of running reveals.
    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.tasks).len()
    }
}

fn lock(tasks: &TaskMap) -> std::sync::MutexGuard<'_, HashMap<String, RevealTask>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_reveal(
    repo: &SharedRepository,
    session_id: &str,
    message_id: &str,
    chars: &[char],
    tick: Duration,
    token: &CancellationToken,
) -> RevealOutcome {
    let total = chars.len();
    let mut revealed = 0;
    let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => return RevealOutcome::Cancelled,
            _ = interval.tick() => {}
        }

        let next = (revealed + 1).min(total);
        let done = next >= total;
        let text: String = chars[..next].iter().collect();

        let mut guard = repo.lock().await;
        if token.is_cancelled() {
            return RevealOutcome::Cancelled;
        }
        let applied = guard.update_streaming_message(session_id, message_id, |message| {
            message.text = text;
            if done {
                message.is_streaming = false;
            }
        });
        drop(guard);

        match applied {
            Ok(true) => {}
            Ok(false) => return RevealOutcome::Abandoned,
            // The in-memory edit stands; only the write failed
            Err(e) => warn!(%session_id, %message_id, error = %e, "failed to persist reveal tick"),
        }

        revealed = next;
        if done {
            return RevealOutcome::Completed;
        }
    }
}
