use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::message::{Message, MessageId};
use crate::session::SessionId;

/// Messages of one session plus the reply currently being filled.
///
/// `is_busy()` is derived from `pending`, so a busy conversation always has
/// exactly one in-flight assistant message and vice versa.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    session_id: Option<SessionId>,
    messages: Vec<Message>,
    pending: Option<MessageId>,
    /// Bumped on every change to `messages` or `pending`
    revision: u64,
}

impl ConversationState {
    pub fn new(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            pending: None,
            revision: 0,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> Option<&MessageId> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn pending_index(&self) -> Option<usize> {
        let pending = self.pending.as_ref()?;
        // The in-flight message is almost always last
        self.messages.iter().rposition(|m| &m.id == pending)
    }

    pub(crate) fn pending_message_mut(&mut self) -> Option<&mut Message> {
        let index = self.pending_index()?;
        self.messages.get_mut(index)
    }

    pub(crate) fn set_messages(&mut self, messages: Vec<Message>) {
        self.revision += 1;
        self.messages = messages;
    }

    pub(crate) fn messages_mut(&mut self) -> &mut Vec<Message> {
        self.revision += 1;
        &mut self.messages
    }

    pub(crate) fn clear_pending(&mut self) -> Option<MessageId> {
        self.revision += 1;
        self.pending.take()
    }
}

/// Notifications for the chat surface
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// Running text of the in-flight reply
    Partial {
        session_id: Option<SessionId>,
        message_id: MessageId,
        text: String,
        errored: bool,
    },
    /// The message list changed shape (turn started, finalized, failed)
    MessagesChanged {
        session_id: Option<SessionId>,
        messages: Vec<Message>,
    },
    /// A different session (or none) became active
    SessionChanged { session_id: Option<SessionId> },
}

/// Fan-out of conversation events to any number of subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ConversationEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConversationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: ConversationEvent) {
        // Dropped receivers are pruned on the next emit
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Shared handle to one session's conversation state.
///
/// A send keeps the handle it started with, so its result lands here even
/// if another session has been selected in the meantime.
pub struct Conversation {
    state: Mutex<ConversationState>,
    events: EventBus,
}

impl Conversation {
    pub fn new(session_id: Option<SessionId>, events: EventBus) -> Self {
        Self {
            state: Mutex::new(ConversationState::new(session_id)),
            events,
        }
    }

    pub fn snapshot(&self) -> ConversationState {
        self.state.lock().clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.state.lock().session_id.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().is_busy()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    /// Append the user message and an empty reply, marking the conversation
    /// busy. Returns `None` if a reply is already in flight.
    pub(crate) fn begin_turn(&self, text: &str) -> Option<MessageId> {
        let (pending, event) = {
            let mut state = self.state.lock();
            if state.is_busy() {
                return None;
            }
            let placeholder = Message::placeholder();
            let pending = placeholder.id.clone();
            state.messages.push(Message::user(text));
            state.messages.push(placeholder);
            state.pending = Some(pending.clone());
            state.revision += 1;

            (
                pending,
                ConversationEvent::MessagesChanged {
                    session_id: state.session_id.clone(),
                    messages: state.messages.clone(),
                },
            )
        };
        self.events.emit(event);
        Some(pending)
    }

    /// Attach a freshly created session to an unbound conversation
    pub(crate) fn bind_session(&self, id: SessionId) {
        let mut state = self.state.lock();
        if state.session_id.is_none() {
            state.session_id = Some(id);
        }
    }

    /// Run `f` under the state lock
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub(crate) fn emit(&self, event: ConversationEvent) {
        self.events.emit(event);
    }
}
