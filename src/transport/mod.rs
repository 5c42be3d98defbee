// Gateway module for transport - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod http;
mod sse;
mod traits;
mod types;

// Public re-exports - the ONLY way to access transport functionality
pub use http::HttpTransport;
pub use sse::SseDecoder;
pub use traits::Transport;
#[cfg(test)]
pub use traits::MockTransport;
pub use types::{
    Dispatch, EventStream, MessageRecord, NamedEvent, RunRecord, RunStatus, SessionRecord,
};
