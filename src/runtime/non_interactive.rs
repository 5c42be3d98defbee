use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::{
    cli::OutputFormat,
    conversation::{ConversationOrchestrator, ErrorTag, Role, SendOutcome},
    retrieval::RetrievalReport,
    utils::log_error,
};

/// Result of a non-interactive run
#[derive(Debug, Serialize, Deserialize)]
pub struct NonInteractiveResult {
    /// The prompt that was sent
    pub prompt: String,
    /// Session the prompt went to
    pub session_id: Option<String>,
    /// The assistant's reply (or the error text standing in for it)
    pub response: String,
    /// Set when the reply is an error
    pub error: Option<ErrorSummary>,
    /// Metadata about the execution
    pub metadata: ExecutionMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: String,
    pub detail: String,
}

impl From<&ErrorTag> for ErrorSummary {
    fn from(tag: &ErrorTag) -> Self {
        Self {
            kind: tag.kind.label().to_string(),
            detail: tag.detail.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub run_id: Option<String>,
    /// Retrieval path, e.g. `dispatched -> streaming -> reconciling -> done`
    pub retrieval: Option<String>,
    pub streamed: bool,
    pub polls: u32,
    /// Execution time in milliseconds
    pub duration_ms: u128,
}

impl ExecutionMetadata {
    fn from_report(report: &RetrievalReport, duration_ms: u128) -> Self {
        Self {
            run_id: Some(report.run_id.clone()),
            retrieval: Some(report.path()),
            streamed: report.stream_opened,
            polls: report.polls,
            duration_ms,
        }
    }
}

/// Non-interactive runner for sending a single prompt
pub struct NonInteractiveRunner {
    orchestrator: ConversationOrchestrator,
}

impl NonInteractiveRunner {
    pub fn new(orchestrator: ConversationOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Send the prompt and wait for the settled reply
    pub async fn execute(&self, prompt: &str) -> Result<NonInteractiveResult> {
        let start_time = Instant::now();
        let outcome = self.orchestrator.send(prompt).await;
        let duration_ms = start_time.elapsed().as_millis();

        let metadata = match &outcome {
            SendOutcome::Empty => bail!("Prompt is empty"),
            SendOutcome::Busy => bail!("A reply is already in flight"),
            SendOutcome::Replied(report) => ExecutionMetadata::from_report(report, duration_ms),
            SendOutcome::Failed(e) => {
                log_error("[send]", e);
                ExecutionMetadata {
                    duration_ms,
                    ..Default::default()
                }
            }
        };

        let state = self.orchestrator.snapshot();
        let reply = state
            .messages()
            .last()
            .filter(|m| m.role == Role::Assistant);

        Ok(NonInteractiveResult {
            prompt: prompt.trim().to_string(),
            session_id: state.session_id().map(|id| id.to_string()),
            response: reply.map(|m| m.text()).unwrap_or_default(),
            error: reply.and_then(|m| m.error.as_ref()).map(ErrorSummary::from),
            metadata,
        })
    }

    /// Format the result according to the output format
    pub fn format_result(&self, result: &NonInteractiveResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_else(|e| {
                format!("{{\"error\": \"Failed to serialize result: {}\"}}", e)
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                output.push_str(&result.response);

                if let Some(error) = &result.error {
                    output.push_str("\n\n--- Error ---\n");
                    output.push_str(&format!("[{}] {}\n", error.kind, error.detail));
                }

                output
            }
            OutputFormat::Markdown => {
                let mut output = String::new();

                output.push_str("## Response\n\n");
                output.push_str(&result.response);
                output.push_str("\n\n");

                if let Some(error) = &result.error {
                    output.push_str("## Error\n\n");
                    output.push_str(&format!("- **{}**: {}\n\n", error.kind, error.detail));
                }

                output.push_str("---\n");
                output.push_str(&format!(
                    "*Session: {} | Retrieval: {} | Duration: {}ms*\n",
                    result.session_id.as_deref().unwrap_or("none"),
                    result.metadata.retrieval.as_deref().unwrap_or("failed"),
                    result.metadata.duration_ms
                ));

                output
            }
        }
    }
}
