use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::sse::SseDecoder;
use super::traits::Transport;
use super::types::{Dispatch, EventStream, MessageRecord, RunRecord, RunStatus, SessionRecord};
use crate::app::CredentialResolver;
use crate::constants::{
    ERROR_BODY_PREVIEW_CHARS, HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS,
};
use crate::utils::{ChatError, TransportFailure};

/// Transport speaking the session REST API over reqwest
pub struct HttpTransport {
    client: Client,
    /// Separate client without a total timeout; event streams stay open
    /// for as long as the run takes
    stream_client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialResolver>,
    streaming: bool,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialResolver>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ChatError> {
        let timeout =
            request_timeout.unwrap_or(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS));
        let connect_timeout = Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS);

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;
        let stream_client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            stream_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            streaming: true,
        })
    }

    /// Advertise (or stop advertising) event-stream support
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, ChatError> {
        let credential = self.credentials.resolve()?;
        Ok(request.header("Authorization", credential.bearer()))
    }

    async fn execute(&self, request: RequestBuilder, what: &str) -> Result<Response, ChatError> {
        let response = self
            .authorize(request)?
            .send()
            .await
            .map_err(ChatError::network)?;
        check_status(response, what).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChatError> {
        debug!(path, "GET");
        let response = self.execute(self.client.get(self.url(path)), path).await?;
        response.json::<T>().await.map_err(ChatError::decode)
    }
}

/// Map non-2xx responses onto the error taxonomy
async fn check_status(response: Response, what: &str) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ChatError::NotFound(what.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let text = text.chars().take(ERROR_BODY_PREVIEW_CHARS).collect::<String>();
    Err(ChatError::transport(
        TransportFailure::from_status(status.as_u16()),
        format!("HTTP {}: {}", status, text),
    ))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ChatError> {
        self.get_json("/sessions").await
    }

    async fn create_session(&self, assistant_id: &str) -> Result<SessionRecord, ChatError> {
        debug!(assistant = assistant_id, "POST /sessions");
        let request = self
            .client
            .post(self.url("/sessions"))
            .json(&json!({ "assistant_id": assistant_id }));
        let response = self.execute(request, "/sessions").await?;
        response.json().await.map_err(ChatError::decode)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ChatError> {
        debug!(session = session_id, "DELETE session");
        let request = self
            .client
            .delete(self.url(&format!("/sessions/{}", session_id)));
        self.execute(request, session_id).await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, ChatError> {
        self.get_json(&format!("/sessions/{}/messages", session_id))
            .await
            .map_err(|e| match e {
                ChatError::NotFound(_) => ChatError::NotFound(session_id.to_string()),
                other => other,
            })
    }

    async fn post_message(&self, session_id: &str, content: &str) -> Result<Dispatch, ChatError> {
        debug!(session = session_id, chars = content.len(), "POST message");
        let request = self
            .client
            .post(self.url(&format!("/sessions/{}/messages", session_id)))
            .json(&json!({ "content": content }));
        let response = self.execute(request, session_id).await?;
        response.json().await.map_err(ChatError::decode)
    }

    async fn run_status(&self, session_id: &str, run_id: &str) -> Result<RunStatus, ChatError> {
        let run: RunRecord = self
            .get_json(&format!("/sessions/{}/runs/{}", session_id, run_id))
            .await?;
        Ok(run.status)
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn open_stream(&self, session_id: &str, run_id: &str) -> Result<EventStream, ChatError> {
        let path = format!("/sessions/{}/runs/{}/events", session_id, run_id);
        debug!(path = %path, "opening event stream");

        let request = self
            .stream_client
            .get(self.url(&path))
            .header("Accept", "text/event-stream");
        let response = self.execute(request, &path).await?;

        let mut decoder = SseDecoder::new();
        let body = response.bytes_stream().map(Some).chain(stream::iter([None]));
        let events = body.flat_map(move |chunk| {
            let batch: Vec<Result<_, ChatError>> = match chunk {
                Some(Ok(bytes)) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                Some(Err(e)) => vec![Err(ChatError::network(e))],
                // End of body
                None => decoder.finish().into_iter().map(Ok).collect(),
            };
            stream::iter(batch)
        });

        Ok(events.boxed())
    }
}
