/// Retrieval module - Gateway
///
/// Turns a dispatched run into a settled reply, by stream or by poll.

mod events;
mod selector;
mod state;

pub use events::RunEvent;
pub(crate) use selector::cancellable;
pub use selector::RetrievalStrategySelector;
pub use state::{RetrievalReport, RetrievalState};
