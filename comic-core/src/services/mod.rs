//! External collaborators consumed by the pipeline.
//!
//! Each capability is an async trait so the pipeline can run against the
//! production services ([`gemini`], [`process`]) or the scripted doubles in
//! [`crate::testing`].

pub mod gemini;
pub mod process;

use crate::comic::ImageAsset;
use crate::error::ServiceError;
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Downloads the audio track of a video reference.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download audio for `reference` into `scratch_dir` and return the file path.
    ///
    /// The caller owns `scratch_dir` and removes it afterwards.
    async fn fetch_audio(&self, reference: &str, scratch_dir: &Path)
        -> Result<PathBuf, ServiceError>;
}

/// Turns an audio file into a transcript.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, ServiceError>;
}

/// Generates free text or JSON from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: TextPrompt) -> Result<String, ServiceError>;
}

/// Generates one image from a prompt and optional reference images.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: ImagePrompt) -> Result<ImageAsset, ServiceError>;
}

/// Prompt for the text collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPrompt {
    pub system: Option<String>,
    pub prompt: String,
    /// Ask for a JSON-only response.
    pub json: bool,
    pub temperature: Option<f32>,
}

impl TextPrompt {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            json: false,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Prompt for the image collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePrompt {
    /// Index of the panel being drawn.
    pub panel: usize,
    pub prompt: String,
    /// Earlier panels to keep characters consistent with, oldest first.
    pub references: Vec<ImageAsset>,
}

/// The four collaborators one pipeline needs.
#[derive(Clone)]
pub struct Services {
    pub media: Arc<dyn MediaFetcher>,
    pub speech: Arc<dyn SpeechToText>,
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageGenerator>,
}

/// Bound a collaborator call by `limit`; hitting it is a [`ServiceErrorKind::Timeout`].
///
/// [`ServiceErrorKind::Timeout`]: crate::error::ServiceErrorKind::Timeout
pub(crate) async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::timeout(limit)),
    }
}
