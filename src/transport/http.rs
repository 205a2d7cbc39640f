//! HTTP transport over the backend's JSON API.
//!
//! `GET  {base}/conversations/{id}/messages` returns the history array.
//! `POST {base}/conversations/{id}/messages` sends user text and returns
//! `{"answer": ..., "id": ...}`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::{HistoryMessage, SendReceipt, Transport};
use crate::config::BackendConfig;
use crate::error::NetworkError;
use crate::messages::Attachment;

/// Longest response body quoted in an error.
const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Serialize)]
struct SendRequest<'a> {
    sender_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "no_attachments")]
    attachments: &'a [Attachment],
}

fn no_attachments(attachments: &&[Attachment]) -> bool {
    attachments.is_empty()
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    base_url: String,
    api_token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, api_token: Option<SecretString>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.base_url.clone(), config.api_token.clone())
    }

    fn messages_url(&self, conversation_id: &str) -> String {
        format!("{}/conversations/{conversation_id}/messages", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send a request and decode a 2xx JSON body.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, NetworkError> {
        let resp = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| NetworkError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(endpoint, status = status.as_u16(), "Backend request rejected");
            return Err(NetworkError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        resp.json::<T>().await.map_err(|e| NetworkError::InvalidResponse {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_history(&self, conversation_id: &str) -> Result<Vec<HistoryMessage>, NetworkError> {
        let url = self.messages_url(conversation_id);
        let history: Vec<HistoryMessage> = self.execute(self.client.get(&url), &url).await?;
        tracing::debug!(conversation_id, records = history.len(), "History fetched");
        Ok(history)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<SendReceipt, NetworkError> {
        let url = self.messages_url(conversation_id);
        let body = SendRequest {
            sender_id,
            text,
            attachments,
        };
        let receipt: SendReceipt = self.execute(self.client.post(&url).json(&body), &url).await?;
        tracing::debug!(conversation_id, server_id = ?receipt.id, "Message delivered");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let transport = HttpTransport::new("http://localhost:9000/api/", None);
        assert_eq!(
            transport.messages_url("c1"),
            "http://localhost:9000/api/conversations/c1/messages"
        );
    }

    #[test]
    fn send_request_omits_empty_attachments() {
        let body = SendRequest {
            sender_id: "u1",
            text: "hi",
            attachments: &[],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"sender_id": "u1", "text": "hi"}));
    }

    #[tokio::test]
    async fn unreachable_backend_is_request_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let transport = HttpTransport::new("http://127.0.0.1:9", None);
        let err = transport.fetch_history("c1").await.unwrap_err();
        assert!(matches!(err, NetworkError::RequestFailed { .. }));
    }
}
