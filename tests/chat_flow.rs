//! Integration tests for the full send → exchange → reveal flow.

use async_trait::async_trait;
use mau::chat::{
    APOLOGY_TEXT, ChatOrchestrator, ExchangeClient, ExchangeRequest, ExchangeResponse,
    RevealScheduler, SendOutcome,
};
use mau::core::state::{LEGACY_TITLE, Role};
use mau::core::{SessionRepository, UserProfile};
use mau::storage::{FileBackend, KeyValueStore, MemoryBackend};
use mau::{Error, Result};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const TICK: Duration = Duration::from_millis(30);

/// Replies with a fixed response, or fails, and counts calls.
struct ScriptedClient {
    reply: std::result::Result<ExchangeResponse, String>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn replying(response: &str, mode: Option<&str>) -> Self {
        Self {
            reply: Ok(ExchangeResponse {
                response: response.to_string(),
                mode: mode.map(str::to_string),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            reply: Err("connection refused".to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ExchangeClient for ScriptedClient {
    async fn exchange(&self, _request: &ExchangeRequest) -> Result<ExchangeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map_err(Error::Transport)
    }
}

/// Holds every exchange until released.
struct GatedClient {
    release: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl ExchangeClient for GatedClient {
    async fn exchange(&self, _request: &ExchangeRequest) -> Result<ExchangeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(ExchangeResponse {
            response: "おまたせ".to_string(),
            mode: None,
        })
    }
}

fn orchestrator(
    store: Arc<dyn KeyValueStore>,
    client: Arc<dyn ExchangeClient>,
) -> (ChatOrchestrator, String) {
    let repo = SessionRepository::open(Arc::clone(&store)).unwrap();
    let session_id = repo.current_session_id().unwrap().to_string();
    let profile = UserProfile::load(store).unwrap();
    let chat = ChatOrchestrator::new(
        repo.into_shared(),
        profile,
        client,
        RevealScheduler::new(TICK),
        "Asia/Tokyo",
    );
    (chat, session_id)
}

async fn wait_until_idle(chat: &ChatOrchestrator) {
    while chat.is_awaiting_response() {
        tokio::time::sleep(TICK).await;
    }
}

#[tokio::test(start_paused = true)]
async fn reply_is_revealed_and_session_named() {
    let client = Arc::new(ScriptedClient::replying("やほー！", Some("MAIN")));
    let (chat, session_id) = orchestrator(Arc::new(MemoryBackend::new()), client.clone());
    let updated_before = chat
        .repository()
        .lock()
        .await
        .session(&session_id)
        .unwrap()
        .updated_at;

    let outcome = chat.send(&session_id, "やほー").await.unwrap();
    let SendOutcome::Revealing { message_id } = outcome else {
        panic!("expected a reveal, got {outcome:?}");
    };
    assert!(chat.is_awaiting_response());

    wait_until_idle(&chat).await;

    let repo = chat.repository().lock().await;
    let session = repo.session(&session_id).unwrap();
    assert_eq!(session.messages.len(), 3);
    assert_eq!(session.messages[1].role, Role::User);
    assert_eq!(session.messages[1].text, "やほー");

    let reply = &session.messages[2];
    assert_eq!(reply.id, message_id);
    assert_eq!(reply.role, Role::Ai);
    assert_eq!(reply.text, "やほー！");
    assert!(!reply.is_streaming);

    assert_eq!(session.title, "やほー");
    assert!(session.updated_at > updated_before);
    assert_eq!(chat.current_mode().as_deref(), Some("MAIN"));
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_appends_apology() {
    let client = Arc::new(ScriptedClient::failing());
    let (chat, session_id) = orchestrator(Arc::new(MemoryBackend::new()), client);

    let outcome = chat.send(&session_id, "こんにちは").await.unwrap();
    assert_eq!(outcome, SendOutcome::Failed);
    assert!(!chat.is_awaiting_response());

    let repo = chat.repository().lock().await;
    let session = repo.session(&session_id).unwrap();
    assert_eq!(session.messages.len(), 3);
    assert_eq!(session.messages[1].text, "こんにちは");
    assert_eq!(session.messages[2].role, Role::Ai);
    assert_eq!(session.messages[2].text, APOLOGY_TEXT);
    assert!(chat.current_mode().is_none());
}

#[tokio::test(start_paused = true)]
async fn second_send_is_rejected_while_in_flight() {
    let client = Arc::new(GatedClient {
        release: Notify::new(),
        calls: AtomicUsize::new(0),
    });
    let (chat, session_id) = orchestrator(Arc::new(MemoryBackend::new()), client.clone());

    let first = tokio::spawn({
        let chat = chat.clone();
        let session_id = session_id.clone();
        async move { chat.send(&session_id, "一回目").await }
    });
    while client.calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let second = chat.send(&session_id, "二回目").await.unwrap();
    assert_eq!(second, SendOutcome::Busy);
    {
        let repo = chat.repository().lock().await;
        let user_messages = repo
            .session(&session_id)
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        assert_eq!(user_messages, 1);
    }

    client.release.notify_one();
    assert!(matches!(
        first.await.unwrap().unwrap(),
        SendOutcome::Revealing { .. }
    ));
    wait_until_idle(&chat).await;

    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    let repo = chat.repository().lock().await;
    let session = repo.session(&session_id).unwrap();
    assert_eq!(session.messages.last().unwrap().text, "おまたせ");
}

#[tokio::test(start_paused = true)]
async fn deleting_session_mid_reveal_reopens_gate() {
    let client = Arc::new(ScriptedClient::replying("とっても長いお返事をしているところ", None));
    let (chat, session_id) = orchestrator(Arc::new(MemoryBackend::new()), client);

    chat.send(&session_id, "ねえねえ").await.unwrap();
    tokio::time::sleep(TICK * 3).await;
    assert!(chat.is_awaiting_response());

    chat.delete_session(&session_id).await.unwrap();
    wait_until_idle(&chat).await;

    let repo = chat.repository().lock().await;
    assert!(repo.session(&session_id).is_none());
    assert_eq!(repo.sessions().len(), 1);
    assert_ne!(repo.current_session_id(), Some(session_id.as_str()));
}

#[tokio::test(start_paused = true)]
async fn conversation_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn KeyValueStore> =
        Arc::new(FileBackend::new(dir.path().to_path_buf()).unwrap());
    let client = Arc::new(ScriptedClient::replying("またね", None));
    let (chat, session_id) = orchestrator(store, client);

    chat.send(&session_id, "おやすみ").await.unwrap();
    wait_until_idle(&chat).await;

    let reopened = SessionRepository::open(Arc::new(
        FileBackend::new(dir.path().to_path_buf()).unwrap(),
    ))
    .unwrap();
    assert_eq!(reopened.current_session_id(), Some(session_id.as_str()));

    let session = reopened.session(&session_id).unwrap();
    let texts: Vec<&str> = session.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts[1..], ["おやすみ", "またね"]);
    assert!(session.messages.iter().all(|m| !m.is_streaming));
    assert_eq!(session.title, "おやすみ");
}

#[test]
fn legacy_messages_migrate_into_file_store() {
    let dir = TempDir::new().unwrap();
    let backend = FileBackend::new(dir.path().to_path_buf()).unwrap();
    backend
        .set(
            "messages",
            &json!([
                {"id": "m1", "role": "ai", "text": "やほす〜"},
                {"id": "m2", "role": "user", "text": "ひさしぶり", "isStreaming": true}
            ]),
        )
        .unwrap();

    let repo = SessionRepository::open(Arc::new(backend)).unwrap();

    assert_eq!(repo.sessions().len(), 1);
    let session = repo.current_session().unwrap();
    assert_eq!(session.title, LEGACY_TITLE);
    assert_eq!(session.messages.len(), 2);
    assert!(session.messages.iter().all(|m| !m.is_streaming));
}
