//! Error taxonomy for the comic pipeline.
//!
//! Collaborators fail with [`ServiceError`]; each pipeline stage maps those
//! into a [`ComicError`] kind, and the orchestrator wraps terminal failures in
//! a [`PipelineError`] carrying the stage at which the run stopped.

use crate::progress::Stage;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What went wrong inside an external collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Connection or transport failure.
    Network,
    /// The service answered with an error status.
    Api,
    /// The call exceeded its per-call timeout.
    Timeout,
    /// The service answered, but not with what was asked for.
    Malformed,
    /// The service refused the prompt (safety filters and the like).
    Refused,
    /// A local helper process exited unsuccessfully.
    Process,
    /// The collaborator is misconfigured (missing key, bad binary path).
    Config,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceErrorKind::Network => "network error",
            ServiceErrorKind::Api => "API error",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::Malformed => "malformed response",
            ServiceErrorKind::Refused => "request refused",
            ServiceErrorKind::Process => "process error",
            ServiceErrorKind::Config => "configuration error",
        };
        f.write_str(name)
    }
}

impl ServiceErrorKind {
    fn class(self) -> ErrorClass {
        match self {
            ServiceErrorKind::Network | ServiceErrorKind::Timeout | ServiceErrorKind::Malformed => {
                ErrorClass::RetryLater
            }
            ServiceErrorKind::Refused => ErrorClass::FixInput,
            ServiceErrorKind::Api | ServiceErrorKind::Process | ServiceErrorKind::Config => {
                ErrorClass::ServiceUnavailable
            }
        }
    }
}

/// Failure reported by a media, speech, text or image collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Api, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ServiceErrorKind::Timeout,
            format!("no response after {after:?}"),
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Malformed, message)
    }

    pub fn process(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Process, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Config, message)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ServiceErrorKind::Timeout
    }
}

impl From<gemini::Error> for ServiceError {
    fn from(err: gemini::Error) -> Self {
        match err {
            gemini::Error::NoApiKey => ServiceError::config("GOOGLE_API_KEY not set"),
            gemini::Error::Config(message) => ServiceError::config(message),
            gemini::Error::Network(message) => ServiceError::network(message),
            gemini::Error::Api { status, message } => {
                ServiceError::api(format!("status {status}: {message}"))
            }
            gemini::Error::Parse(message) => ServiceError::malformed(message),
            gemini::Error::Blocked(reason) => {
                ServiceError::new(ServiceErrorKind::Refused, format!("blocked: {reason}"))
            }
        }
    }
}

/// Errors from the comic generation pipeline.
#[derive(Debug, Clone, Error)]
pub enum ComicError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported source kind: {0}")]
    UnsupportedSource(String),

    #[error("Failed to fetch media '{reference}': {source}")]
    MediaFetch {
        reference: String,
        source: ServiceError,
    },

    #[error("Transcription failed: {source}")]
    Transcription { source: ServiceError },

    #[error("Unknown audience band: {0}")]
    UnknownAudienceBand(String),

    #[error("Script generation failed: {reason}")]
    ScriptGeneration { reason: String },

    #[error("Panel {panel} failed after {attempts} attempts: {source}")]
    Render {
        panel: usize,
        attempts: u32,
        source: ServiceError,
    },

    #[error("Generation service error: {0}")]
    GenerationService(#[from] ServiceError),

    #[error("Cancelled")]
    Cancelled,

    /// The orchestrator tried to leave its state machine. Always a bug.
    #[error("Illegal pipeline transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

/// Coarse grouping that tells a caller what to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is at fault.
    FixInput,
    /// A transient failure; resubmitting may succeed.
    RetryLater,
    /// A collaborator is unavailable or misconfigured.
    ServiceUnavailable,
    /// The caller cancelled the run.
    Cancelled,
}

impl ComicError {
    pub fn script(reason: impl Into<String>) -> Self {
        ComicError::ScriptGeneration {
            reason: reason.into(),
        }
    }

    /// Classify this error for the caller.
    ///
    /// Errors wrapping a [`ServiceError`] take their class from its kind.
    pub fn class(&self) -> ErrorClass {
        match self {
            ComicError::InvalidRequest(_)
            | ComicError::UnsupportedSource(_)
            | ComicError::UnknownAudienceBand(_) => ErrorClass::FixInput,
            ComicError::ScriptGeneration { .. } => ErrorClass::RetryLater,
            // The fetcher answered but could not use the reference.
            ComicError::MediaFetch { source, .. } => match source.kind {
                ServiceErrorKind::Api
                | ServiceErrorKind::Malformed
                | ServiceErrorKind::Refused
                | ServiceErrorKind::Process => ErrorClass::FixInput,
                kind => kind.class(),
            },
            ComicError::Transcription { source }
            | ComicError::Render { source, .. }
            | ComicError::GenerationService(source) => source.kind.class(),
            ComicError::Cancelled => ErrorClass::Cancelled,
            ComicError::IllegalTransition { .. } => ErrorClass::ServiceUnavailable,
        }
    }

    /// Short kind name, stable across message changes.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ComicError::InvalidRequest(_) => "invalid_request",
            ComicError::UnsupportedSource(_) => "unsupported_source",
            ComicError::MediaFetch { .. } => "media_fetch",
            ComicError::Transcription { .. } => "transcription",
            ComicError::UnknownAudienceBand(_) => "unknown_audience_band",
            ComicError::ScriptGeneration { .. } => "script_generation",
            ComicError::Render { .. } => "render",
            ComicError::GenerationService(_) => "generation_service",
            ComicError::Cancelled => "cancelled",
            ComicError::IllegalTransition { .. } => "illegal_transition",
        }
    }
}

/// A terminal pipeline failure and the stage where it happened.
#[derive(Debug, Clone, Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: ComicError,
}

impl PipelineError {
    pub fn new(stage: Stage, error: ComicError) -> Self {
        Self { stage, error }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, ComicError::Cancelled)
    }

    /// The reason recorded in the `Aborted` state.
    pub fn reason(&self) -> String {
        if self.is_cancelled() {
            "cancelled".to_string()
        } else {
            self.error.to_string()
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.error.class()
    }
}
