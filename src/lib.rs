pub mod app;
pub mod cli;
pub mod constants;
pub mod conversation;
pub mod retrieval;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod testing;

pub use app::{load_config, ClientSettings, Config};
pub use conversation::{ConversationEvent, ConversationOrchestrator, SendOutcome};
pub use utils::{ChatError, ErrorKind};
