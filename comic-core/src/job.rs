//! Background jobs: a pipeline run on its own task with a progress stream.

use crate::cancel::CancellationToken;
use crate::comic::ComicResult;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::progress::ProgressEvent;
use crate::request::GenerationRequest;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Errors from waiting on a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Job task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A running generation.
///
/// Progress events arrive on [`GenerationJob::events`], which ends once the run
/// finishes. Dropping the job does not stop the run; call [`cancel`](Self::cancel).
pub struct GenerationJob {
    pub events: UnboundedReceiverStream<ProgressEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<ComicResult, PipelineError>>,
}

impl GenerationJob {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this job.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run to finish. Unread events are dropped.
    pub async fn wait(self) -> Result<ComicResult, JobError> {
        Ok(self.handle.await??)
    }

    /// Split into the event stream and a future-like handle for the result.
    pub fn into_parts(
        self,
    ) -> (
        UnboundedReceiverStream<ProgressEvent>,
        CancellationToken,
        JoinHandle<Result<ComicResult, PipelineError>>,
    ) {
        (self.events, self.cancel, self.handle)
    }
}

/// Spawn `request` on the current tokio runtime.
pub fn spawn(pipeline: Arc<Pipeline>, request: GenerationRequest) -> GenerationJob {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let handle = tokio::spawn(async move {
        // The sender drops with this task, closing the stream.
        pipeline.run(&request, &tx, &token).await
    });

    GenerationJob {
        events: UnboundedReceiverStream::new(rx),
        cancel,
        handle,
    }
}
