/// Conversation module - Gateway
///
/// Message state, reconciliation and the orchestrator that ties sessions,
/// sends and retrieval together.

mod message;
mod orchestrator;
mod reconciler;
mod state;

pub use message::{ErrorTag, Message, MessageId, Role};
pub use orchestrator::{ConversationOrchestrator, SendOutcome};
pub use reconciler::{chronological, MessageReconciler};
pub use state::{Conversation, ConversationEvent, ConversationState, EventBus};
