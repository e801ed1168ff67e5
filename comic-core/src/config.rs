//! Pipeline and collaborator configuration.
//!
//! Both objects are built once at startup and passed explicitly; nothing in
//! the pipeline reads the environment on its own.

use crate::context::DEFAULT_WINDOW_SIZE;
use crate::services::gemini::{GeminiImage, GeminiText, DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL};
use crate::services::process::{Whisper, YtDlp};
use crate::services::Services;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No API key configured - set GOOGLE_API_KEY environment variable")]
    MissingApiKey,

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// What the orchestrator does when a panel exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFailurePolicy {
    /// Abort the run. Keeps the page/panel count intact.
    #[default]
    Abort,
    /// Leave the panel out and finish with a partial result.
    SkipPanel,
}

/// Knobs for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rendered panels kept as continuity context.
    pub context_window: usize,
    /// Retries after the first render attempt.
    pub max_render_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_base_delay: Duration,
    /// Upper bound for any single collaborator call.
    pub call_timeout: Duration,
    pub render_failure_policy: RenderFailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_WINDOW_SIZE,
            max_render_retries: 2,
            retry_base_delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(180),
            render_failure_policy: RenderFailurePolicy::Abort,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the context window size (at least 1).
    pub fn with_context_window(mut self, size: usize) -> Self {
        self.context_window = size.max(1);
        self
    }

    pub fn with_max_render_retries(mut self, retries: u32) -> Self {
        self.max_render_retries = retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Opt into partial results when panels fail.
    pub fn with_render_failure_policy(mut self, policy: RenderFailurePolicy) -> Self {
        self.render_failure_policy = policy;
        self
    }
}

/// Credentials, models and helper binaries for the production collaborators.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub ytdlp_binary: PathBuf,
    pub whisper_binary: PathBuf,
    pub whisper_model: String,
}

impl ServiceConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            ytdlp_binary: PathBuf::from("yt-dlp"),
            whisper_binary: PathBuf::from("whisper"),
            whisper_model: "base".to_string(),
        }
    }

    /// Read `GOOGLE_API_KEY` and the optional `COMIC_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("GOOGLE_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Some(model) = lookup("COMIC_TEXT_MODEL") {
            config.text_model = non_empty("COMIC_TEXT_MODEL", model)?;
        }
        if let Some(model) = lookup("COMIC_IMAGE_MODEL") {
            config.image_model = non_empty("COMIC_IMAGE_MODEL", model)?;
        }
        if let Some(binary) = lookup("COMIC_YTDLP_BIN") {
            config.ytdlp_binary = non_empty("COMIC_YTDLP_BIN", binary)?.into();
        }
        if let Some(binary) = lookup("COMIC_WHISPER_BIN") {
            config.whisper_binary = non_empty("COMIC_WHISPER_BIN", binary)?.into();
        }
        if let Some(model) = lookup("COMIC_WHISPER_MODEL") {
            config.whisper_model = non_empty("COMIC_WHISPER_MODEL", model)?;
        }
        Ok(config)
    }

    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.text_model = model.into();
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Wire up the production collaborators.
    pub fn build_services(&self) -> Services {
        let client = ::gemini::Gemini::new(&self.api_key);
        Services {
            media: Arc::new(YtDlp::new(&self.ytdlp_binary)),
            speech: Arc::new(Whisper::new(&self.whisper_binary, &self.whisper_model)),
            text: Arc::new(GeminiText::new(client.clone(), &self.text_model)),
            images: Arc::new(GeminiImage::new(client, &self.image_model)),
        }
    }
}

fn non_empty(name: &str, value: String) -> Result<String, ConfigError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        })
    } else {
        Ok(value)
    }
}
