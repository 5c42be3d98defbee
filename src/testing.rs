//! In-memory service used by the conversation and retrieval tests

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::transport::{
    Dispatch, EventStream, MessageRecord, NamedEvent, RunStatus, SessionRecord, Transport,
};
use crate::utils::{ChatError, TransportFailure};

type StreamScript = Result<Vec<Result<NamedEvent, ChatError>>, ChatError>;

/// Scripted fake of the remote session service.
///
/// Posting a message records it in the session's feed and, if a reply is
/// scripted, the assistant's answer right after it. Feeds are served
/// newest-first.
pub(crate) struct ScriptedTransport {
    streaming: bool,
    stream: Mutex<Option<StreamScript>>,
    statuses: Mutex<VecDeque<RunStatus>>,
    reply: Mutex<Option<String>>,
    post_error: Mutex<Option<ChatError>>,
    gate: Option<Arc<Notify>>,
    history_gate: Mutex<Option<Arc<Notify>>>,
    stream_held_open: bool,
    sessions: Mutex<Vec<SessionRecord>>,
    feeds: Mutex<HashMap<String, Vec<MessageRecord>>>,
    clock: Mutex<i64>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            streaming: false,
            stream: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            reply: Mutex::new(None),
            post_error: Mutex::new(None),
            gate: None,
            history_gate: Mutex::new(None),
            stream_held_open: false,
            sessions: Mutex::new(Vec::new()),
            feeds: Mutex::new(HashMap::new()),
            clock: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_session(self, id: &str) -> Self {
        self.sessions.lock().push(SessionRecord {
            id: id.to_string(),
            thread_id: None,
            title: None,
            created_at: None,
        });
        self.feeds.lock().entry(id.to_string()).or_default();
        self
    }

    pub fn with_reply(self, text: &str) -> Self {
        self.set_reply(Some(text));
        self
    }

    /// Change the scripted reply for later posts
    pub fn set_reply(&self, text: Option<&str>) {
        *self.reply.lock() = text.map(str::to_string);
    }

    /// Advertise streaming and serve these events from `open_stream`
    pub fn with_stream(mut self, events: Vec<Result<NamedEvent, ChatError>>) -> Self {
        self.streaming = true;
        *self.stream.lock() = Some(Ok(events));
        self
    }

    /// Like `with_stream`, but the channel stays open after the events
    pub fn with_open_stream(mut self, events: Vec<Result<NamedEvent, ChatError>>) -> Self {
        self.stream_held_open = true;
        self.with_stream(events)
    }

    /// Advertise streaming but fail to open the channel
    pub fn with_stream_open_error(mut self, error: ChatError) -> Self {
        self.streaming = true;
        *self.stream.lock() = Some(Err(error));
        self
    }

    /// Statuses returned by successive polls; `completed` once exhausted
    pub fn with_statuses(self, statuses: Vec<RunStatus>) -> Self {
        *self.statuses.lock() = statuses.into();
        self
    }

    pub fn with_post_error(self, error: ChatError) -> Self {
        *self.post_error.lock() = Some(error);
        self
    }

    /// Hold every `post_message` until the gate is notified
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Hold the next `list_messages` until the gate is notified. The feed is
    /// read before waiting, so the caller gets what was there at the time.
    pub fn with_history_gate(self, gate: Arc<Notify>) -> Self {
        *self.history_gate.lock() = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn tick(&self) -> DateTime<Utc> {
        let mut clock = self.clock.lock();
        *clock += 1;
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::seconds(*clock)
    }

    fn push_message(&self, session_id: &str, role: &str, content: &str) {
        let created_at = self.tick();
        let mut feeds = self.feeds.lock();
        let feed = feeds.entry(session_id.to_string()).or_default();
        let id = format!("{}_m{}", session_id, feed.len() + 1);
        feed.push(MessageRecord {
            id,
            role: role.to_string(),
            content: content.to_string(),
            created_at,
        });
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, ChatError> {
        self.record("list_sessions".into());
        Ok(self.sessions.lock().clone())
    }

    async fn create_session(&self, assistant_id: &str) -> Result<SessionRecord, ChatError> {
        self.record(format!("create_session:{}", assistant_id));
        let mut sessions = self.sessions.lock();
        let record = SessionRecord {
            id: format!("s_new{}", sessions.len() + 1),
            thread_id: Some("thread_fake".into()),
            title: None,
            created_at: Some(Utc::now()),
        };
        sessions.push(record.clone());
        self.feeds.lock().entry(record.id.clone()).or_default();
        Ok(record)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), ChatError> {
        self.record(format!("delete_session:{}", session_id));
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|s| s.id != session_id);
        if sessions.len() == before {
            return Err(ChatError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, ChatError> {
        self.record(format!("list_messages:{}", session_id));
        let mut feed = self
            .feeds
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(session_id.to_string()))?;
        feed.reverse();
        let gate = self.history_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(feed)
    }

    async fn post_message(&self, session_id: &str, content: &str) -> Result<Dispatch, ChatError> {
        self.record(format!("post_message:{}", session_id));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(error) = self.post_error.lock().clone() {
            return Err(error);
        }

        self.push_message(session_id, "user", content);
        let reply = self.reply.lock().clone();
        if let Some(reply) = reply {
            self.push_message(session_id, "assistant", &reply);
        }
        Ok(Dispatch {
            run_id: format!("run_{}", self.count("post_message")),
            status: Some(RunStatus::Queued),
        })
    }

    async fn run_status(&self, _session_id: &str, run_id: &str) -> Result<RunStatus, ChatError> {
        self.record(format!("run_status:{}", run_id));
        Ok(self
            .statuses
            .lock()
            .pop_front()
            .unwrap_or(RunStatus::Completed))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn open_stream(&self, _session_id: &str, run_id: &str) -> Result<EventStream, ChatError> {
        self.record(format!("open_stream:{}", run_id));
        match self.stream.lock().clone() {
            Some(Ok(events)) if self.stream_held_open => {
                Ok(stream::iter(events).chain(stream::pending()).boxed())
            }
            Some(Ok(events)) => Ok(stream::iter(events).boxed()),
            Some(Err(error)) => Err(error),
            None => Err(ChatError::transport(
                TransportFailure::Status(404),
                "no event stream scripted",
            )),
        }
    }
}
