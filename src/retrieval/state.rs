use std::fmt;

use serde::Serialize;
use tracing::debug;

/// Where a single send currently is on its way to a settled reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalState {
    Dispatched,
    Streaming,
    Polling,
    Reconciling,
    Done,
    Failed,
}

impl RetrievalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Legal edges of the retrieval state machine
    pub fn can_transition_to(&self, next: RetrievalState) -> bool {
        use RetrievalState::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Dispatched, Streaming | Polling | Reconciling) => true,
            (Streaming, Polling | Reconciling) => true,
            (Polling, Reconciling) => true,
            (Reconciling, Done) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Streaming => "streaming",
            Self::Polling => "polling",
            Self::Reconciling => "reconciling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RetrievalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace of one retrieval, returned once the reply has settled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalReport {
    pub run_id: String,
    pub transitions: Vec<RetrievalState>,
    pub polls: u32,
    pub deltas: u32,
    pub stream_opened: bool,
}

impl RetrievalReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            transitions: vec![RetrievalState::Dispatched],
            polls: 0,
            deltas: 0,
            stream_opened: false,
        }
    }

    pub fn state(&self) -> RetrievalState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(RetrievalState::Dispatched)
    }

    /// Move to `next`, recording the edge
    pub fn enter(&mut self, next: RetrievalState) {
        let from = self.state();
        debug_assert!(
            from.can_transition_to(next),
            "illegal retrieval transition {} -> {}",
            from,
            next
        );
        debug!(run = %self.run_id, from = %from, state = %next, "retrieval transition");
        self.transitions.push(next);
    }

    /// Transitions as `a -> b -> c`
    pub fn path(&self) -> String {
        self.transitions
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
