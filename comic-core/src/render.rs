//! Panel rendering with a bounded retry budget.

use crate::audience::AudienceProfile;
use crate::cancel::CancellationToken;
use crate::comic::{PanelDescriptor, RenderedPanel};
use crate::context::ContextPayload;
use crate::error::{ComicError, ServiceError};
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::services::{with_timeout, ImageGenerator, ImagePrompt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// How often and how patiently a panel is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay after the `failed_attempt`-th failure (1-based): the base delay
    /// doubled per earlier failure, plus up to half the base as jitter.
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1 << exponent);

        let jitter_ms = (self.base_delay.as_millis() / 2) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Renders one panel at a time through the image collaborator.
pub struct PanelRenderer {
    images: Arc<dyn ImageGenerator>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl PanelRenderer {
    pub fn new(images: Arc<dyn ImageGenerator>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            images,
            retry,
            call_timeout,
        }
    }

    /// Render `descriptor`, retrying within the budget.
    ///
    /// `total` is only used for progress messages. Fails with
    /// [`ComicError::Render`] once every attempt has failed, or with
    /// [`ComicError::Cancelled`] if `cancel` fires between attempts.
    pub async fn render(
        &self,
        descriptor: &PanelDescriptor,
        context: &ContextPayload,
        profile: &AudienceProfile,
        total: usize,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RenderedPanel, ComicError> {
        let prompt = build_image_prompt(descriptor, context, profile);
        let max_attempts = self.retry.max_attempts();
        let mut last_error: Option<ServiceError> = None;

        for attempt in 1..=max_attempts {
            sink.emit(ProgressEvent::for_panel(
                Stage::Rendering,
                descriptor.index,
                format!(
                    "rendering panel {} of {}, attempt {}",
                    descriptor.index + 1,
                    total,
                    attempt
                ),
            ));

            let result =
                with_timeout(self.call_timeout, self.images.generate_image(prompt.clone())).await;

            match result {
                Ok(image) if !image.is_empty() => {
                    tracing::debug!(panel = descriptor.index, attempt, bytes = image.len(), "panel rendered");
                    return Ok(RenderedPanel {
                        descriptor: descriptor.clone(),
                        image,
                        render_attempts: attempt,
                    });
                }
                Ok(_) => last_error = Some(ServiceError::malformed("image has no data")),
                Err(err) => last_error = Some(err),
            }

            if attempt < max_attempts {
                cancel.check()?;
                let delay = self.retry.delay_for(attempt);
                tracing::warn!(
                    panel = descriptor.index,
                    attempt,
                    error = ?last_error,
                    ?delay,
                    "render attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                cancel.check()?;
            }
        }

        Err(ComicError::Render {
            panel: descriptor.index,
            attempts: max_attempts,
            source: last_error.unwrap_or_else(|| ServiceError::malformed("no render attempted")),
        })
    }
}

/// Build the image prompt for one panel, carrying the context window.
pub fn build_image_prompt(
    descriptor: &PanelDescriptor,
    context: &ContextPayload,
    profile: &AudienceProfile,
) -> ImagePrompt {
    let mut prompt = format!(
        "Draw a single comic panel.\n\
         ART STYLE: {style}\n\
         SCENE: {scene}\n\
         MOOD: {mood}\n",
        style = profile.art_style,
        scene = descriptor.scene,
        mood = descriptor.mood,
    );

    if !descriptor.characters.is_empty() {
        let characters: Vec<&str> = descriptor.characters.iter().map(String::as_str).collect();
        prompt.push_str(&format!("CHARACTERS: {}\n", characters.join(", ")));
    }

    prompt.push_str(&format!(
        "TEXT: letter this caption or dialogue clearly inside the panel: \"{}\"\n",
        descriptor.caption
    ));

    if !context.is_empty() {
        prompt.push_str("\nPREVIOUS PANELS (the attached images, oldest first):\n");
        prompt.push_str(&context.describe());

        let recurring = context.recurring_characters(descriptor);
        if recurring.is_empty() {
            prompt.push_str("Keep the art style and palette consistent with these panels.\n");
        } else {
            let names: Vec<&str> = recurring.iter().map(String::as_str).collect();
            prompt.push_str(&format!(
                "Keep {} looking exactly as in these panels, in the same art style.\n",
                names.join(", ")
            ));
        }
    }

    ImagePrompt {
        panel: descriptor.index,
        prompt,
        references: context.images(),
    }
}
