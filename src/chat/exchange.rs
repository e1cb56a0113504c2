//! Request/response contract with the remote chat endpoint.

use crate::core::state::{Message, Role};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One prior message sent as context.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Author of the message.
    pub role: Role,
    /// Message text.
    pub text: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            text: message.text.clone(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExchangeRequest {
    /// Trimmed user input.
    pub text: String,
    /// Display name of the user.
    pub user_name: String,
    /// Most recent messages, oldest first.
    pub history: Vec<HistoryEntry>,
    /// IANA timezone of the caller.
    pub timezone: String,
}

/// Success body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExchangeResponse {
    /// Full reply text.
    pub response: String,
    /// Operating mode the companion answered in, if reported.
    #[serde(default)]
    pub mode: Option<String>,
}

/// Remote inference collaborator.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Send one exchange and wait for the full reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on network failure, timeout, or a
    /// non-success status.
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse>;
}

/// Take the last `limit` messages as request history, oldest first.
#[must_use]
pub fn recent_history(messages: &[Message], limit: usize) -> Vec<HistoryEntry> {
    let start = messages.len().saturating_sub(limit);
    messages[start..].iter().map(HistoryEntry::from).collect()
}

/// [`ExchangeClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpExchangeClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpExchangeClient {
    /// Create a client for the API at `base_url`.
    ///
    /// Every request is abandoned after `timeout`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl ExchangeClient for HttpExchangeClient {
    async fn exchange(&self, request: &ExchangeRequest) -> Result<ExchangeResponse> {
        debug!(
            history = request.history.len(),
            timezone = %request.timezone,
            "sending chat exchange"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("chat endpoint returned {status}: {body}")));
        }

        response
            .json::<ExchangeResponse>()
            .await
            .map_err(|e| Error::Transport(format!("invalid chat response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_wire_shape() {
        let request = ExchangeRequest {
            text: "やほー".to_string(),
            user_name: "Guest".to_string(),
            history: vec![HistoryEntry {
                role: Role::Ai,
                text: "やほす〜".to_string(),
            }],
            timezone: "Asia/Tokyo".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "text": "やほー",
                "user_name": "Guest",
                "history": [{"role": "ai", "text": "やほす〜"}],
                "timezone": "Asia/Tokyo"
            })
        );
    }

    #[test]
    fn response_mode_is_optional() {
        let with_mode: ExchangeResponse =
            serde_json::from_value(json!({"response": "やほー！", "mode": "MAIN"})).unwrap();
        assert_eq!(with_mode.mode.as_deref(), Some("MAIN"));

        let without: ExchangeResponse =
            serde_json::from_value(json!({"response": "ok"})).unwrap();
        assert!(without.mode.is_none());
    }

    #[test]
    fn recent_history_keeps_last_entries_in_order() {
        let messages: Vec<Message> = (0..15).map(|i| Message::user(i.to_string())).collect();
        let history = recent_history(&messages, 12);

        assert_eq!(history.len(), 12);
        assert_eq!(history[0].text, "3");
        assert_eq!(history[11].text, "14");
    }

    #[test]
    fn recent_history_handles_short_sessions() {
        let messages = vec![Message::ai("welcome")];
        let history = recent_history(&messages, 12);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Ai);
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = HttpExchangeClient::new("http://localhost:8000/", Duration::from_secs(30));
        assert_eq!(client.endpoint(), "http://localhost:8000/api/chat");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let client = HttpExchangeClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let request = ExchangeRequest {
            text: "hi".to_string(),
            user_name: "Guest".to_string(),
            history: vec![],
            timezone: "UTC".to_string(),
        };

        let err = client.exchange(&request).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
