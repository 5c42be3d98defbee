use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transport::SessionRecord;
use crate::utils::ChatError;

/// Service-assigned session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Which remote assistant new sessions are opened against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssistantRef(String);

impl AssistantRef {
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ChatError::Config("assistant reference is empty".into()));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ChatError::Config(format!(
                "assistant reference '{}' contains whitespace",
                raw
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One durable conversation on the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Remote thread token, kept opaque
    pub thread: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Label for pickers and listings
    pub fn display_name(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.clone(),
            _ => format!("Session {}", self.id),
        }
    }

    /// One-line summary for listings
    pub fn summary(&self) -> String {
        match self.created_at {
            Some(at) => format!(
                "{} | {} | {}",
                at.format("%Y-%m-%d %H:%M"),
                self.id,
                self.display_name()
            ),
            None => format!("{} | {}", self.id, self.display_name()),
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: SessionId::new(record.id),
            thread: record.thread_id,
            title: record.title,
            created_at: record.created_at,
        }
    }
}
