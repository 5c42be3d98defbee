use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::events::RunEvent;
use super::state::{RetrievalReport, RetrievalState};
use crate::app::RetrievalOptions;
use crate::conversation::MessageReconciler;
use crate::session::SessionId;
use crate::transport::{Dispatch, EventStream, RunStatus, Transport};
use crate::utils::ChatError;

/// Race `future` against `cancel`
pub(crate) async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> Result<T, ChatError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ChatError::Cancelled),
        value = future => Ok(value),
    }
}

/// Drives a dispatched run to exactly one outcome.
///
/// Streams when both the options and the transport allow it, polls
/// otherwise (or when the event channel cannot be opened), and always ends
/// by handing the authoritative history to the reconciler.
pub struct RetrievalStrategySelector {
    transport: Arc<dyn Transport>,
    options: RetrievalOptions,
}

impl RetrievalStrategySelector {
    pub fn new(transport: Arc<dyn Transport>, options: RetrievalOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &RetrievalOptions {
        &self.options
    }

    pub async fn retrieve(
        &self,
        session: &SessionId,
        dispatch: &Dispatch,
        reconciler: &MessageReconciler,
        cancel: &CancellationToken,
    ) -> Result<RetrievalReport, ChatError> {
        let mut report = RetrievalReport::new(&dispatch.run_id);

        match self.drive(session, dispatch, reconciler, cancel, &mut report).await {
            Ok(()) => {
                report.enter(RetrievalState::Done);
                debug!(session = %session, run = %dispatch.run_id, path = %report.path(), "reply settled");
                Ok(report)
            }
            Err(e) => {
                report.enter(RetrievalState::Failed);
                warn!(session = %session, run = %dispatch.run_id, path = %report.path(), "retrieval failed: {}", e);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &SessionId,
        dispatch: &Dispatch,
        reconciler: &MessageReconciler,
        cancel: &CancellationToken,
        report: &mut RetrievalReport,
    ) -> Result<(), ChatError> {
        match dispatch.status {
            Some(RunStatus::Completed) => {}
            Some(status) if status.is_terminal() => return Err(ChatError::Run { status }),
            _ => self.await_run(session, dispatch, reconciler, cancel, report).await?,
        }

        report.enter(RetrievalState::Reconciling);
        let records = cancellable(cancel, self.transport.list_messages(session.as_str())).await??;
        debug!(session = %session, count = records.len(), "authoritative history fetched");
        reconciler.finalize(records);
        Ok(())
    }

    async fn await_run(
        &self,
        session: &SessionId,
        dispatch: &Dispatch,
        reconciler: &MessageReconciler,
        cancel: &CancellationToken,
        report: &mut RetrievalReport,
    ) -> Result<(), ChatError> {
        if self.options.prefer_streaming && self.transport.supports_streaming() {
            report.enter(RetrievalState::Streaming);
            let opened = cancellable(
                cancel,
                self.transport.open_stream(session.as_str(), &dispatch.run_id),
            )
            .await?;

            match opened {
                Ok(stream) => {
                    report.stream_opened = true;
                    return consume_stream(stream, reconciler, cancel, report).await;
                }
                Err(e) => {
                    warn!(session = %session, run = %dispatch.run_id, "event stream unavailable, polling instead: {}", e);
                }
            }
        }

        report.enter(RetrievalState::Polling);
        self.poll(session, &dispatch.run_id, cancel, report).await
    }

    async fn poll(
        &self,
        session: &SessionId,
        run_id: &str,
        cancel: &CancellationToken,
        report: &mut RetrievalReport,
    ) -> Result<(), ChatError> {
        loop {
            cancellable(cancel, tokio::time::sleep(self.options.poll_interval)).await?;
            report.polls += 1;

            let status = cancellable(cancel, self.transport.run_status(session.as_str(), run_id)).await??;
            trace!(run = %run_id, %status, poll = report.polls, "run status");
            match status {
                RunStatus::Completed => return Ok(()),
                status if status.is_terminal() => return Err(ChatError::Run { status }),
                _ => {}
            }
        }
    }
}

async fn consume_stream(
    mut stream: EventStream,
    reconciler: &MessageReconciler,
    cancel: &CancellationToken,
    report: &mut RetrievalReport,
) -> Result<(), ChatError> {
    loop {
        let item = match cancellable(cancel, stream.next()).await {
            Ok(item) => item,
            Err(cancelled) => {
                reconciler.mark_partial_error();
                return Err(cancelled);
            }
        };

        let event = match item {
            None => return Ok(()),
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                reconciler.mark_partial_error();
                return Err(match e {
                    ChatError::Stream(_) => e,
                    other => ChatError::Stream(other.to_string()),
                });
            }
        };

        match RunEvent::parse(&event) {
            RunEvent::Delta(text) => {
                report.deltas += 1;
                reconciler.append_delta(&text);
            }
            RunEvent::Error(payload) => {
                reconciler.mark_partial_error();
                return Err(ChatError::Stream(payload));
            }
            RunEvent::Completed => return Ok(()),
            RunEvent::Ignored => trace!(event = event.name(), "ignoring stream event"),
        }
    }
}
