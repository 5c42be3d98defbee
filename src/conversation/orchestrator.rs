use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::MessageId;
use super::reconciler::MessageReconciler;
use super::state::{Conversation, ConversationEvent, ConversationState, EventBus};
use crate::app::{ClientSettings, RetrievalOptions};
use crate::retrieval::{cancellable, RetrievalReport, RetrievalStrategySelector};
use crate::session::{AssistantRef, Session, SessionId, SessionStore};
use crate::transport::Transport;
use crate::utils::ChatError;

/// How a call to [`ConversationOrchestrator::send`] ended
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Blank input; nothing happened
    Empty,
    /// A reply was already in flight; nothing happened
    Busy,
    /// The reply settled normally
    Replied(RetrievalReport),
    /// The turn settled with an error-tagged reply
    Failed(ChatError),
}

impl SendOutcome {
    /// Whether a turn was started at all
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Empty | Self::Busy)
    }
}

/// Settles the turn as cancelled if the send is dropped midway
struct TurnGuard {
    reconciler: MessageReconciler,
    pending: MessageId,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.reconciler.abandon(&self.pending);
    }
}

/// Entry point for the chat surface: sessions, sends, and state.
///
/// Every operation takes `&self`. The active conversation is swapped out on
/// selection; a send keeps the conversation it started on, so a late reply
/// never lands in a session selected afterwards.
pub struct ConversationOrchestrator {
    transport: Arc<dyn Transport>,
    store: SessionStore,
    retrieval: RetrievalStrategySelector,
    assistant: Option<AssistantRef>,
    options: RetrievalOptions,
    events: EventBus,
    current: RwLock<Arc<Conversation>>,
}

impl ConversationOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        assistant: Option<AssistantRef>,
        options: RetrievalOptions,
    ) -> Self {
        let events = EventBus::new();
        Self {
            store: SessionStore::new(transport.clone()),
            retrieval: RetrievalStrategySelector::new(transport.clone(), options.clone()),
            current: RwLock::new(Arc::new(Conversation::new(None, events.clone()))),
            transport,
            assistant,
            options,
            events,
        }
    }

    pub fn from_settings(transport: Arc<dyn Transport>, settings: &ClientSettings) -> Self {
        Self::new(
            transport,
            Some(settings.assistant.clone()),
            settings.retrieval.clone(),
        )
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<ConversationEvent> {
        self.events.subscribe()
    }

    /// Handle to the active conversation
    pub fn conversation(&self) -> Arc<Conversation> {
        self.current.read().clone()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.conversation().snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.conversation().is_busy()
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.store.active()
    }

    /// Sessions as of the last list/create/delete
    pub fn sessions(&self) -> Vec<Session> {
        self.store.sessions()
    }

    pub fn assistant(&self) -> Option<&AssistantRef> {
        self.assistant.as_ref()
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ChatError> {
        self.store.list().await
    }

    /// Create a session and make it active
    pub async fn create_session(&self) -> Result<Session, ChatError> {
        let session = self.store.create(self.assistant.as_ref()).await?;
        self.select_session(&session.id);
        Ok(session)
    }

    /// Make `id` active with a fresh, empty conversation. Local only; use
    /// [`Self::load_history`] to fill it.
    pub fn select_session(&self, id: &SessionId) {
        self.store.select(id);
        self.activate(Some(id.clone()));
        debug!(session = %id, "session selected");
    }

    /// Delete a session. If it was active, the first remaining session
    /// becomes active, or none if there is none left.
    pub async fn delete_session(&self, id: &SessionId) -> Result<(), ChatError> {
        self.store.delete(id).await?;

        if self.conversation().session_id().as_ref() != Some(id) {
            return Ok(());
        }
        match self.store.sessions().into_iter().next() {
            Some(next) => self.select_session(&next.id),
            None => {
                self.store.clear_active();
                self.activate(None);
            }
        }
        Ok(())
    }

    /// Fill the active conversation from the service. Returns `false` when
    /// there is no active session, or a send started or settled while the
    /// history was being fetched.
    pub async fn load_history(&self) -> Result<bool, ChatError> {
        let conversation = self.conversation();
        let Some(session) = conversation.session_id() else {
            return Ok(false);
        };

        // A send that starts while the fetch is out makes the fetch stale
        let revision = conversation.revision();
        let records = self.transport.list_messages(session.as_str()).await?;
        let reconciler = MessageReconciler::new(conversation, self.options.feed_order);
        let loaded = reconciler.replace_history(records, revision);
        if !loaded {
            debug!(session = %session, "history not loaded, conversation changed meanwhile");
        }
        Ok(loaded)
    }

    pub async fn send(&self, text: &str) -> SendOutcome {
        self.send_with_cancel(text, CancellationToken::new()).await
    }

    /// Send `text` on the active conversation and wait for the reply.
    ///
    /// Errors never escape: they settle the turn as an error-tagged reply
    /// and come back as [`SendOutcome::Failed`].
    pub async fn send_with_cancel(&self, text: &str, cancel: CancellationToken) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Empty;
        }

        let conversation = self.conversation();
        let Some(pending) = conversation.begin_turn(text) else {
            debug!("send ignored, reply already in flight");
            return SendOutcome::Busy;
        };
        let reconciler = MessageReconciler::new(conversation.clone(), self.options.feed_order);
        let _guard = TurnGuard {
            reconciler: reconciler.clone(),
            pending: pending.clone(),
        };

        let turn = self.run_turn(&conversation, text, &reconciler, &cancel);
        let result = match self.options.send_timeout {
            Some(limit) => match tokio::time::timeout(limit, turn).await {
                Ok(result) => result,
                Err(_) => Err(ChatError::TimedOut(limit)),
            },
            None => turn.await,
        };

        match result {
            Ok(report) => SendOutcome::Replied(report),
            Err(e) => {
                warn!(session = ?conversation.session_id(), "send failed: {}", e);
                reconciler.fail_turn(&pending, &e);
                SendOutcome::Failed(e)
            }
        }
    }

    async fn run_turn(
        &self,
        conversation: &Arc<Conversation>,
        text: &str,
        reconciler: &MessageReconciler,
        cancel: &CancellationToken,
    ) -> Result<RetrievalReport, ChatError> {
        let session = match conversation.session_id() {
            Some(id) => id,
            None => self.open_session_for(conversation, cancel).await?,
        };

        let dispatch =
            cancellable(cancel, self.transport.post_message(session.as_str(), text)).await??;
        info!(session = %session, run = %dispatch.run_id, "message dispatched");

        self.retrieval
            .retrieve(&session, &dispatch, reconciler, cancel)
            .await
    }

    /// First send without an active session: create one and bind it
    async fn open_session_for(
        &self,
        conversation: &Arc<Conversation>,
        cancel: &CancellationToken,
    ) -> Result<SessionId, ChatError> {
        let session = cancellable(cancel, self.store.create(self.assistant.as_ref())).await??;
        conversation.bind_session(session.id.clone());

        if Arc::ptr_eq(&self.conversation(), conversation) {
            self.store.select(&session.id);
            self.events.emit(ConversationEvent::SessionChanged {
                session_id: Some(session.id.clone()),
            });
        }
        Ok(session.id)
    }

    fn activate(&self, session_id: Option<SessionId>) {
        let conversation = Arc::new(Conversation::new(session_id.clone(), self.events.clone()));
        *self.current.write() = conversation;
        self.events
            .emit(ConversationEvent::SessionChanged { session_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FeedOrder;
    use crate::conversation::Role;
    use crate::testing::ScriptedTransport;
    use crate::transport::{NamedEvent, RunStatus};
    use crate::utils::ErrorKind;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn options() -> RetrievalOptions {
        RetrievalOptions {
            prefer_streaming: true,
            poll_interval: Duration::from_millis(1),
            feed_order: FeedOrder::NewestFirst,
            send_timeout: None,
        }
    }

    fn orchestrator(transport: &Arc<ScriptedTransport>) -> ConversationOrchestrator {
        ConversationOrchestrator::new(
            transport.clone(),
            Some(AssistantRef::parse("asst_1").unwrap()),
            options(),
        )
    }

    fn assert_settled_pair(state: &ConversationState) {
        assert!(!state.is_busy());
        let messages = state.messages();
        assert!(messages.len() >= 2);
        assert_eq!(messages[messages.len() - 2].role, Role::User);
        assert_eq!(messages[messages.len() - 1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_send_settles_user_assistant_pair() {
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1").with_reply("hello"));
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let outcome = orch.send("hi").await;
        assert!(matches!(outcome, SendOutcome::Replied(_)));

        let state = orch.snapshot();
        assert_settled_pair(&state);
        let texts: Vec<String> = state.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
        assert!(!state.messages()[0].id.is_local());
    }

    #[tokio::test]
    async fn test_select_session_is_idempotent() {
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1"));
        let orch = orchestrator(&transport);

        orch.select_session(&SessionId::new("s_1"));
        let first = orch.snapshot();
        orch.select_session(&SessionId::new("s_1"));
        assert_eq!(orch.snapshot(), first);
        assert_eq!(orch.active_session(), Some(SessionId::new("s_1")));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_late_reply_lands_in_original_session() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_a")
                .with_session("s_b")
                .with_reply("for A")
                .with_gate(gate.clone()),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_a"));
        let conversation_a = orch.conversation();

        let (outcome, _) = tokio::join!(orch.send("question for A"), async {
            orch.select_session(&SessionId::new("s_b"));
            gate.notify_one();
        });

        assert!(matches!(outcome, SendOutcome::Replied(_)));
        assert_settled_pair(&conversation_a.snapshot());
        assert_eq!(conversation_a.messages()[1].text(), "for A");

        let state_b = orch.snapshot();
        assert_eq!(state_b.session_id(), Some(&SessionId::new("s_b")));
        assert!(state_b.messages().is_empty());
        assert!(!state_b.is_busy());
    }

    #[tokio::test]
    async fn test_no_stream_support_polls() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_reply("polled")
                .with_statuses(vec![RunStatus::Queued]),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        match orch.send("hi").await {
            SendOutcome::Replied(report) => {
                assert!(!report.stream_opened);
                assert_eq!(report.polls, 2);
            }
            other => panic!("Expected reply, got {:?}", other),
        }
        assert_eq!(transport.count("open_stream"), 0);
        assert_eq!(orch.snapshot().messages()[1].text(), "polled");
    }

    #[tokio::test]
    async fn test_blank_input_is_noop() {
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1"));
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let outcome = orch.send("   ").await;
        assert_eq!(outcome, SendOutcome::Empty);
        assert!(outcome.is_noop());
        assert!(orch.snapshot().messages().is_empty());
        assert!(!orch.is_busy());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_sends_produce_one_pair() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_reply("hello")
                .with_gate(gate.clone()),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let (first, second) = tokio::join!(orch.send("hi"), async {
            let outcome = orch.send("hi").await;
            gate.notify_one();
            outcome
        });

        assert!(matches!(first, SendOutcome::Replied(_)));
        assert_eq!(second, SendOutcome::Busy);
        assert_eq!(orch.snapshot().messages().len(), 2);
        assert_eq!(transport.count("post_message"), 1);
    }

    #[tokio::test]
    async fn test_failed_run_injects_error_reply() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_statuses(vec![RunStatus::InProgress, RunStatus::Failed]),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let outcome = orch.send("hi").await;
        assert_eq!(
            outcome,
            SendOutcome::Failed(ChatError::Run {
                status: RunStatus::Failed
            })
        );

        let state = orch.snapshot();
        assert_settled_pair(&state);
        let reply = &state.messages()[1];
        assert_eq!(reply.error.as_ref().unwrap().kind, ErrorKind::Run);
        assert!(reply.text().contains("failed"));
    }

    #[tokio::test]
    async fn test_stream_error_event_injects_stream_error() {
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1").with_stream(vec![
            Ok(NamedEvent::new("delta", "half")),
            Ok(NamedEvent::new("error", "rate limit reached")),
        ]));
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));
        let mut events = orch.subscribe();

        let outcome = orch.send("hi").await;
        assert_eq!(
            outcome,
            SendOutcome::Failed(ChatError::Stream("rate limit reached".into()))
        );
        let state = orch.snapshot();
        assert_settled_pair(&state);
        assert_eq!(state.messages()[1].error.as_ref().unwrap().kind, ErrorKind::Stream);

        let mut saw_errored_partial = false;
        while let Ok(event) = events.try_recv() {
            if let ConversationEvent::Partial { text, errored: true, .. } = event {
                assert_eq!(text, "half");
                saw_errored_partial = true;
            }
        }
        assert!(saw_errored_partial);
    }

    #[tokio::test]
    async fn test_cancel_settles_turn() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1").with_gate(gate));
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let cancel = CancellationToken::new();
        let (outcome, _) = tokio::join!(orch.send_with_cancel("hi", cancel.clone()), async {
            cancel.cancel();
        });

        assert_eq!(outcome, SendOutcome::Failed(ChatError::Cancelled));
        let state = orch.snapshot();
        assert_settled_pair(&state);
        assert_eq!(state.messages()[1].error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_send_clears_busy() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1").with_gate(gate));
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let mut send = Box::pin(orch.send("hi"));
        assert!(futures::poll!(&mut send).is_pending());
        assert!(orch.is_busy());
        drop(send);

        let state = orch.snapshot();
        assert_settled_pair(&state);
        assert_eq!(state.messages()[1].error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_send_timeout() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1").with_gate(gate));
        let orch = ConversationOrchestrator::new(
            transport.clone(),
            Some(AssistantRef::parse("asst_1").unwrap()),
            RetrievalOptions {
                send_timeout: Some(Duration::from_millis(20)),
                ..options()
            },
        );
        orch.select_session(&SessionId::new("s_1"));

        let outcome = orch.send("hi").await;
        assert_eq!(
            outcome,
            SendOutcome::Failed(ChatError::TimedOut(Duration::from_millis(20)))
        );
        assert_settled_pair(&orch.snapshot());
    }

    #[tokio::test]
    async fn test_first_send_creates_session() {
        let transport = Arc::new(ScriptedTransport::new().with_reply("welcome"));
        let orch = orchestrator(&transport);
        assert_eq!(orch.active_session(), None);

        let outcome = orch.send("hello").await;
        assert!(matches!(outcome, SendOutcome::Replied(_)));
        assert_eq!(transport.count("create_session:asst_1"), 1);
        assert_eq!(orch.active_session(), Some(SessionId::new("s_new1")));

        let state = orch.snapshot();
        assert_eq!(state.session_id(), Some(&SessionId::new("s_new1")));
        assert_settled_pair(&state);
    }

    #[tokio::test]
    async fn test_missing_assistant_fails_before_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let orch = ConversationOrchestrator::new(transport.clone(), None, options());

        let outcome = orch.send("hello").await;
        assert!(matches!(outcome, SendOutcome::Failed(ChatError::Config(_))));
        assert!(transport.calls().is_empty());
        assert_eq!(
            orch.snapshot().messages()[1].error.as_ref().unwrap().kind,
            ErrorKind::Config
        );
    }

    #[tokio::test]
    async fn test_post_failure_keeps_classification() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_post_error(ChatError::transport(
                    crate::utils::TransportFailure::Unauthorized,
                    "bad token",
                )),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let outcome = orch.send("hi").await;
        assert!(matches!(
            outcome,
            SendOutcome::Failed(ChatError::Transport {
                failure: crate::utils::TransportFailure::Unauthorized,
                ..
            })
        ));
        assert_eq!(
            orch.snapshot().messages()[1].error.as_ref().unwrap().kind,
            ErrorKind::Transport
        );
    }

    #[tokio::test]
    async fn test_delete_active_session_selects_next() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_session("s_2"),
        );
        let orch = orchestrator(&transport);
        orch.list_sessions().await.unwrap();
        orch.select_session(&SessionId::new("s_1"));

        orch.delete_session(&SessionId::new("s_1")).await.unwrap();
        assert_eq!(orch.active_session(), Some(SessionId::new("s_2")));
        assert_eq!(orch.snapshot().session_id(), Some(&SessionId::new("s_2")));

        orch.delete_session(&SessionId::new("s_2")).await.unwrap();
        assert_eq!(orch.active_session(), None);
        assert_eq!(orch.snapshot(), ConversationState::new(None));
    }

    #[tokio::test]
    async fn test_delete_unknown_session_leaves_state() {
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1"));
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        let err = orch
            .delete_session(&SessionId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::NotFound("missing".into()));
        assert_eq!(orch.active_session(), Some(SessionId::new("s_1")));
    }

    #[tokio::test]
    async fn test_load_history_after_resume() {
        let transport = Arc::new(ScriptedTransport::new().with_session("s_1").with_reply("hello"));
        let first = orchestrator(&transport);
        first.select_session(&SessionId::new("s_1"));
        first.send("hi").await;

        let resumed = orchestrator(&transport);
        resumed.select_session(&SessionId::new("s_1"));
        assert!(resumed.load_history().await.unwrap());
        assert_eq!(resumed.snapshot().messages(), first.snapshot().messages());
    }

    #[tokio::test]
    async fn test_stale_history_does_not_overwrite_settled_send() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_reply("hello")
                .with_history_gate(gate.clone()),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        // The history fetch reads the empty feed, then waits until the send settled
        let (loaded, outcome) = tokio::join!(orch.load_history(), async {
            let outcome = orch.send("hi").await;
            gate.notify_one();
            outcome
        });

        assert!(matches!(outcome, SendOutcome::Replied(_)));
        assert!(!loaded.unwrap());
        let state = orch.snapshot();
        assert_settled_pair(&state);
        let texts: Vec<String> = state.messages().iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["hi", "hello"]);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_its_reply_after_next_send() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_session("s_1")
                .with_statuses(vec![RunStatus::Failed]),
        );
        let orch = orchestrator(&transport);
        orch.select_session(&SessionId::new("s_1"));

        assert!(matches!(orch.send("first").await, SendOutcome::Failed(_)));
        transport.set_reply(Some("ok"));
        assert!(matches!(orch.send("second").await, SendOutcome::Replied(_)));

        let messages = orch.snapshot().messages().to_vec();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(messages[0].text(), "first");
        let tag = messages[1].error.clone().unwrap();
        assert_eq!(tag.kind, ErrorKind::Run);
        assert!(tag.detail.contains("failed"));
        assert_eq!(messages[2].text(), "second");
        assert_eq!(messages[3].text(), "ok");
    }
}
