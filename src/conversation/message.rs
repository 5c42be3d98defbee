use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::constants::LOCAL_MESSAGE_PREFIX;
use crate::transport::MessageRecord;
use crate::utils::{ChatError, ErrorKind};

/// Reconciliation key for a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh id for a message that only exists locally so far
    pub fn local() -> Self {
        Self(format!("{}{}", LOCAL_MESSAGE_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_MESSAGE_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Structured classification attached to synthetic error replies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorTag {
    pub kind: ErrorKind,
    pub detail: String,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    #[serde(rename = "content", serialize_with = "serialize_fragments")]
    fragments: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,
}

fn serialize_fragments<S: Serializer>(fragments: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&fragments.concat())
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::local(),
            role: Role::User,
            fragments: vec![text.into()],
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Empty assistant message shown while a reply is in flight
    pub fn placeholder() -> Self {
        Self {
            id: MessageId::local(),
            role: Role::Assistant,
            fragments: Vec::new(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Synthetic assistant message standing in for a failed reply
    pub fn error(error: &ChatError) -> Self {
        Self {
            id: MessageId::local(),
            role: Role::Assistant,
            fragments: vec![error.user_message()],
            timestamp: Utc::now(),
            error: Some(ErrorTag {
                kind: error.kind(),
                detail: error.to_string(),
            }),
        }
    }

    /// Convert a service record; roles other than user/assistant are skipped
    pub fn from_record(record: MessageRecord) -> Option<Self> {
        let Some(role) = Role::parse(&record.role) else {
            debug!(id = %record.id, role = %record.role, "skipping message with unsupported role");
            return None;
        };
        Some(Self {
            id: MessageId::new(record.id),
            role,
            fragments: vec![record.content],
            timestamp: record.created_at,
            error: None,
        })
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        self.fragments.push(fragment.to_string());
    }

    /// Canonical text of the message
    pub fn text(&self) -> String {
        self.fragments.concat()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
