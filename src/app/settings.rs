use std::time::Duration;

use super::config::{Config, FeedOrder};
use super::credentials::{Credential, CredentialResolver};
use crate::session::AssistantRef;
use crate::utils::ChatError;

/// Retrieval knobs handed to the conversation core
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub prefer_streaming: bool,
    pub poll_interval: Duration,
    pub feed_order: FeedOrder,
    pub send_timeout: Option<Duration>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&super::config::RetrievalConfig::default())
    }
}

impl From<&super::config::RetrievalConfig> for RetrievalOptions {
    fn from(config: &super::config::RetrievalConfig) -> Self {
        Self {
            prefer_streaming: config.prefer_streaming,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            feed_order: config.feed_order,
            send_timeout: config.send_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Everything needed to talk to the service, validated up front
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub assistant: AssistantRef,
    pub credential: Credential,
    pub request_timeout: Option<Duration>,
    pub retrieval: RetrievalOptions,
}

impl ClientSettings {
    /// Resolve the assistant reference and credential.
    ///
    /// Runs before any network call so a missing identifier is reported as
    /// a configuration problem rather than a failed request.
    pub fn resolve(config: &Config, credentials: &dyn CredentialResolver) -> Result<Self, ChatError> {
        let base_url = config.api.base_url.trim();
        if base_url.is_empty() {
            return Err(ChatError::Config("api.base_url is empty".into()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }

        let assistant = resolve_assistant(config)?;
        let credential = credentials.resolve()?;

        Ok(Self {
            base_url: base_url.to_string(),
            assistant,
            credential,
            request_timeout: config.api.request_timeout_secs.map(Duration::from_secs),
            retrieval: RetrievalOptions::from(&config.retrieval),
        })
    }
}

/// Inline `api.assistant_id` first, then the configured env var
pub fn resolve_assistant(config: &Config) -> Result<AssistantRef, ChatError> {
    let raw = match &config.api.assistant_id {
        Some(id) => id.clone(),
        None => std::env::var(&config.api.assistant_env).map_err(|_| {
            ChatError::Config(format!(
                "no assistant configured; set {} or api.assistant_id",
                config.api.assistant_env
            ))
        })?,
    };
    AssistantRef::parse(&raw)
}
