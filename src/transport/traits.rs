use async_trait::async_trait;

use super::types::{Dispatch, EventStream, MessageRecord, RunStatus, SessionRecord};
use crate::utils::ChatError;

/// Everything the conversation core needs from the remote service.
///
/// Implementations map HTTP failures to [`ChatError`] variants themselves
/// (404 → `NotFound`, other non-2xx → `Transport` with a classified
/// [`crate::utils::TransportFailure`]) so nothing above this layer inspects
/// status codes or error text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET /sessions`
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ChatError>;

    /// `POST /sessions`
    async fn create_session(&self, assistant_id: &str) -> Result<SessionRecord, ChatError>;

    /// `DELETE /sessions/{id}`
    async fn delete_session(&self, session_id: &str) -> Result<(), ChatError>;

    /// `GET /sessions/{id}/messages`, in whatever order the service uses
    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, ChatError>;

    /// `POST /sessions/{id}/messages`, starting an assistant run
    async fn post_message(&self, session_id: &str, content: &str) -> Result<Dispatch, ChatError>;

    /// `GET /sessions/{id}/runs/{run_id}`
    async fn run_status(&self, session_id: &str, run_id: &str) -> Result<RunStatus, ChatError>;

    /// Whether [`Transport::open_stream`] is worth attempting at all
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Open the event channel for a run
    async fn open_stream(&self, session_id: &str, run_id: &str) -> Result<EventStream, ChatError>;
}
