use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::RunStatus;

/// Structured reason for a failed HTTP exchange.
///
/// Built from the status code at the transport boundary so callers can
/// branch on it without looking at message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailure {
    /// 401 from the service
    Unauthorized,
    /// 429 from the service
    RateLimited,
    /// 500 from the service
    ServerError,
    /// Any other non-2xx status
    Status(u16),
    /// Connection, DNS, TLS or body read failure
    Network,
    /// The body could not be decoded
    Decode,
}

impl TransportFailure {
    /// Classify a non-2xx status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            other => Self::Status(other),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized (401)"),
            Self::RateLimited => write!(f, "rate limited (429)"),
            Self::ServerError => write!(f, "server error (500)"),
            Self::Status(code) => write!(f, "HTTP {}", code),
            Self::Network => write!(f, "network failure"),
            Self::Decode => write!(f, "malformed response"),
        }
    }
}

/// Main error type for threadline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error ({failure}): {message}")]
    Transport {
        failure: TransportFailure,
        message: String,
    },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Run ended with status {status}")]
    Run { status: RunStatus },

    #[error("Run completed without an assistant reply")]
    MissingReply,

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),
}

/// Coarse classification carried on error-tagged messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Transport,
    Stream,
    Run,
    NotFound,
    Cancelled,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Transport => "transport",
            Self::Stream => "stream",
            Self::Run => "run",
            Self::NotFound => "not found",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ChatError {
    pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::Transport {
            failure,
            message: message.into(),
        }
    }

    pub fn network(err: impl fmt::Display) -> Self {
        Self::transport(TransportFailure::Network, err.to_string())
    }

    pub fn decode(err: impl fmt::Display) -> Self {
        Self::transport(TransportFailure::Decode, err.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Stream(_) => ErrorKind::Stream,
            Self::Run { .. } | Self::MissingReply => ErrorKind::Run,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Cancelled | Self::TimedOut(_) => ErrorKind::Cancelled,
        }
    }

    /// Text shown in place of an assistant reply when a send fails
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(detail) => format!("Configuration problem: {}", detail),
            Self::Transport { failure, message } => match failure {
                TransportFailure::Unauthorized => {
                    "The assistant service rejected the credential (401). Check your API key."
                        .to_string()
                }
                TransportFailure::RateLimited => {
                    "The assistant service is rate limiting requests (429). Try again shortly."
                        .to_string()
                }
                TransportFailure::ServerError => {
                    "The assistant service hit an internal error (500).".to_string()
                }
                TransportFailure::Status(code) => {
                    format!("The assistant service answered HTTP {}: {}", code, message)
                }
                TransportFailure::Network => {
                    format!("Could not reach the assistant service: {}", message)
                }
                TransportFailure::Decode => {
                    format!("The assistant service sent an unreadable response: {}", message)
                }
            },
            Self::Stream(payload) => format!("The reply stream failed: {}", payload),
            Self::Run { status } => format!("The assistant run ended with status '{}'.", status),
            Self::MissingReply => "The assistant finished without replying.".to_string(),
            Self::NotFound(id) => format!("Session {} no longer exists.", id),
            Self::Cancelled => "Request cancelled.".to_string(),
            Self::TimedOut(after) => format!("No reply within {}s.", after.as_secs()),
        }
    }
}
