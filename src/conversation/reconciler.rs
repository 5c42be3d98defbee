use std::sync::Arc;

use tracing::{debug, warn};

use super::message::{Message, MessageId, Role};
use super::state::{Conversation, ConversationEvent, ConversationState};
use crate::app::FeedOrder;
use crate::transport::MessageRecord;
use crate::utils::ChatError;

/// Put an authoritative feed into chronological order.
///
/// The configured order is applied first. If the result is out of order the
/// opposite order is tried, and failing that a stable sort by timestamp
/// (prompts before replies on ties) takes over.
pub fn chronological(mut records: Vec<MessageRecord>, order: FeedOrder) -> Vec<MessageRecord> {
    if order == FeedOrder::NewestFirst {
        records.reverse();
    }
    if in_order(&records) {
        return records;
    }

    records.reverse();
    if in_order(&records) {
        warn!(?order, "message feed arrived in the opposite of the configured order");
        return records;
    }

    warn!(?order, "message feed is not ordered, sorting by timestamp");
    records.sort_by_key(|r| (r.created_at, role_rank(&r.role)));
    records
}

fn in_order(records: &[MessageRecord]) -> bool {
    let sorted = records
        .windows(2)
        .all(|pair| pair[0].created_at <= pair[1].created_at);
    // A reply may share its prompt's timestamp but never comes before it
    let reply_first = matches!(
        records,
        [first, second, ..] if first.role == "assistant"
            && second.role == "user"
            && first.created_at == second.created_at
    );
    sorted && !reply_first
}

fn role_rank(role: &str) -> u8 {
    match role {
        "user" => 0,
        _ => 1,
    }
}

/// Applies streamed and authoritative content to one conversation
#[derive(Clone)]
pub struct MessageReconciler {
    conversation: Arc<Conversation>,
    feed_order: FeedOrder,
}

impl MessageReconciler {
    pub fn new(conversation: Arc<Conversation>, feed_order: FeedOrder) -> Self {
        Self {
            conversation,
            feed_order,
        }
    }

    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    /// Append a streamed fragment to the in-flight reply and publish the
    /// running text. Returns `None` when nothing is in flight.
    pub fn append_delta(&self, fragment: &str) -> Option<String> {
        let (message_id, session_id, text) = self.conversation.with_state(|state| {
            let session_id = state.session_id().cloned();
            let message = state.pending_message_mut()?;
            message.push_fragment(fragment);
            Some((message.id.clone(), session_id, message.text()))
        })?;

        self.conversation.emit(ConversationEvent::Partial {
            session_id,
            message_id,
            text: text.clone(),
            errored: false,
        });
        Some(text)
    }

    /// Publish the partial reply once more, flagged as errored
    pub fn mark_partial_error(&self) {
        let event = self.conversation.with_state(|state| {
            let session_id = state.session_id().cloned();
            let message = state.pending_message_mut()?;
            Some(ConversationEvent::Partial {
                session_id,
                message_id: message.id.clone(),
                text: message.text(),
                errored: true,
            })
        });
        if let Some(event) = event {
            self.conversation.emit(event);
        }
    }

    /// Text accumulated so far for the in-flight reply
    pub fn partial_text(&self) -> Option<String> {
        self.conversation
            .with_state(|state| state.pending_message_mut().map(|m| m.text()))
    }

    /// Replace the whole local history with the service's record of it and
    /// settle the in-flight reply.
    pub fn finalize(&self, records: Vec<MessageRecord>) {
        let messages = self.authoritative(records);
        let event = self.conversation.with_state(|state| {
            let carried = local_error_replies(state);
            let turn_user = turn_user_message(state);
            let had_pending = state.clear_pending().is_some();
            let feed_empty = messages.is_empty();
            state.set_messages(messages);

            // The service has no record of this turn at all; keep the prompt
            if had_pending && feed_empty {
                if let Some(user) = turn_user {
                    state.messages_mut().push(user);
                }
            }
            pair_replies(state, carried);
            changed(state)
        });
        self.conversation.emit(event);
    }

    /// Load history into an idle conversation that is still at `revision`.
    /// Returns `false` (and leaves the state alone) if a reply is in flight
    /// or the conversation changed since `revision` was read.
    pub fn replace_history(&self, records: Vec<MessageRecord>, revision: u64) -> bool {
        let messages = self.authoritative(records);
        let event = self.conversation.with_state(|state| {
            if state.is_busy() || state.revision() != revision {
                return None;
            }
            let carried = local_error_replies(state);
            state.set_messages(messages);
            pair_replies(state, carried);
            Some(changed(state))
        });
        match event {
            Some(event) => {
                self.conversation.emit(event);
                true
            }
            None => false,
        }
    }

    /// Settle the in-flight reply as a failure. The placeholder is replaced
    /// by an error-tagged assistant message; with nothing in flight the
    /// error message is appended instead.
    pub fn inject_error(&self, error: &ChatError) {
        let event = self.conversation.with_state(|state| {
            let replacement = Message::error(error);
            match state.pending_index() {
                Some(index) => state.messages_mut()[index] = replacement,
                None => state.messages_mut().push(replacement),
            }
            state.clear_pending();
            changed(state)
        });
        self.conversation.emit(event);
    }

    /// Fail the turn identified by `pending` with `error`, but only if that
    /// turn is still in flight. Returns whether anything changed.
    pub fn fail_turn(&self, pending: &MessageId, error: &ChatError) -> bool {
        let event = self.conversation.with_state(|state| {
            if state.pending() != Some(pending) {
                return None;
            }
            let index = state.pending_index()?;
            state.messages_mut()[index] = Message::error(error);
            state.clear_pending();
            Some(changed(state))
        });
        match event {
            Some(event) => {
                self.conversation.emit(event);
                true
            }
            None => false,
        }
    }

    /// Fail the turn as cancelled if it never settled
    pub fn abandon(&self, pending: &MessageId) {
        if self.fail_turn(pending, &ChatError::Cancelled) {
            debug!(message = %pending, "send dropped before it settled");
        }
    }

    fn authoritative(&self, records: Vec<MessageRecord>) -> Vec<Message> {
        chronological(records, self.feed_order)
            .into_iter()
            .filter_map(Message::from_record)
            .collect()
    }
}

/// The user message that opened the in-flight turn
fn turn_user_message(state: &ConversationState) -> Option<Message> {
    let index = state.pending_index()?.checked_sub(1)?;
    state
        .messages()
        .get(index)
        .filter(|m| m.role == Role::User)
        .cloned()
}

/// Error replies injected locally, keyed by the prompt they answer
fn local_error_replies(state: &ConversationState) -> Vec<(String, Message)> {
    state
        .messages()
        .windows(2)
        .filter(|pair| pair[0].role == Role::User && pair[1].is_error())
        .map(|pair| (pair[0].text(), pair[1].clone()))
        .collect()
}

/// Give every user message a reply after a full overwrite. The service
/// keeps prompts of failed runs but not our error replies, so those are
/// carried over when their prompt is still there; anything else unanswered
/// gets a `MissingReply` error.
fn pair_replies(state: &mut ConversationState, mut carried: Vec<(String, Message)>) {
    let messages = std::mem::take(state.messages_mut());
    let mut paired = Vec::with_capacity(messages.len() + 1);
    let mut missing = 0;

    let mut iter = messages.into_iter().peekable();
    while let Some(message) = iter.next() {
        let unanswered = message.role == Role::User
            && iter.peek().map_or(true, |next| next.role != Role::Assistant);
        let prompt = message.text();
        paired.push(message);

        if unanswered {
            let reply = match carried.iter().position(|(text, _)| *text == prompt) {
                Some(index) => carried.remove(index).1,
                None => {
                    missing += 1;
                    Message::error(&ChatError::MissingReply)
                }
            };
            paired.push(reply);
        }
    }

    if missing > 0 {
        warn!(missing, "authoritative history has prompts without a reply");
    }
    state.set_messages(paired);
}

fn changed(state: &ConversationState) -> ConversationEvent {
    ConversationEvent::MessagesChanged {
        session_id: state.session_id().cloned(),
        messages: state.messages().to_vec(),
    }
}
