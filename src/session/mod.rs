/// Session management module - Gateway

mod selector;
mod store;
mod types;

pub use selector::select_session;
pub use store::SessionStore;
pub use types::{AssistantRef, Session, SessionId};
