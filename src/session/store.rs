use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::types::{AssistantRef, Session, SessionId};
use crate::transport::Transport;
use crate::utils::ChatError;

/// Locally cached view of the service's sessions plus the active one.
///
/// Network calls never run while a lock is held; the cache is updated in a
/// short critical section once the call has settled.
pub struct SessionStore {
    transport: Arc<dyn Transport>,
    sessions: RwLock<Vec<Session>>,
    active: RwLock<Option<SessionId>>,
}

impl SessionStore {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sessions: RwLock::new(Vec::new()),
            active: RwLock::new(None),
        }
    }

    /// Refresh the cache from the service, keeping the service's order
    pub async fn list(&self) -> Result<Vec<Session>, ChatError> {
        let records = self.transport.list_sessions().await?;
        let sessions: Vec<Session> = records.into_iter().map(Session::from).collect();
        debug!(count = sessions.len(), "session list refreshed");

        *self.sessions.write() = sessions.clone();
        Ok(sessions)
    }

    /// Open a new session on the service
    pub async fn create(&self, assistant: Option<&AssistantRef>) -> Result<Session, ChatError> {
        let assistant = assistant
            .ok_or_else(|| ChatError::Config("no assistant reference configured".into()))?;

        let record = self.transport.create_session(assistant.as_str()).await?;
        let session = Session::from(record);
        info!(session = %session.id, "session created");

        self.sessions.write().push(session.clone());
        Ok(session)
    }

    /// Delete a session on the service and drop it from the cache
    pub async fn delete(&self, id: &SessionId) -> Result<(), ChatError> {
        self.transport
            .delete_session(id.as_str())
            .await
            .map_err(|e| match e {
                ChatError::NotFound(_) => ChatError::NotFound(id.to_string()),
                other => other,
            })?;
        info!(session = %id, "session deleted");

        self.sessions.write().retain(|s| &s.id != id);
        let mut active = self.active.write();
        if active.as_ref() == Some(id) {
            *active = None;
        }
        Ok(())
    }

    /// Mark a session active. Local only.
    pub fn select(&self, id: &SessionId) {
        *self.active.write() = Some(id.clone());
    }

    pub fn clear_active(&self) {
        *self.active.write() = None;
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active.read().clone()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.read().clone()
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().iter().find(|s| &s.id == id).cloned()
    }
}
