//! Gemini-backed text and image collaborators.

use super::{ImageGenerator, ImagePrompt, TextGenerator, TextPrompt};
use crate::comic::ImageAsset;
use crate::error::ServiceError;
use ::gemini::{Content, Gemini, Modality, Part, Request};
use async_trait::async_trait;

/// Default model for concept extraction and script writing.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";

/// Default model for panel images.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

/// Text generation through a Gemini text model.
pub struct GeminiText {
    client: Gemini,
    model: String,
}

impl GeminiText {
    pub fn new(client: Gemini, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiText {
    async fn generate_text(&self, prompt: TextPrompt) -> Result<String, ServiceError> {
        let mut request =
            Request::new(vec![Content::user(prompt.prompt)]).with_model(&self.model);

        if let Some(system) = prompt.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = prompt.temperature {
            request = request.with_temperature(temperature);
        }
        if prompt.json {
            request = request.with_json_output();
        }

        let response = self.client.generate(request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ServiceError::malformed(format!(
                "empty text response (finish reason {:?})",
                response.finish_reason()
            )));
        }

        tracing::debug!(
            model = %self.model,
            prompt_tokens = response.usage.prompt_tokens,
            output_tokens = response.usage.output_tokens,
            "text generated"
        );
        Ok(text)
    }
}

/// Image generation through a Gemini image model.
pub struct GeminiImage {
    client: Gemini,
    model: String,
}

impl GeminiImage {
    pub fn new(client: Gemini, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for GeminiImage {
    async fn generate_image(&self, prompt: ImagePrompt) -> Result<ImageAsset, ServiceError> {
        let mut parts = Vec::with_capacity(prompt.references.len() + 1);
        parts.push(Part::text(prompt.prompt));
        for reference in &prompt.references {
            parts.push(Part::image(reference.mime_type(), reference.bytes().to_vec()));
        }

        let request = Request::new(vec![Content::user_parts(parts)])
            .with_model(&self.model)
            .with_response_modalities(vec![Modality::Image]);

        let response = self.client.generate(request).await?;

        match response.images().first() {
            Some(blob) if !blob.data.is_empty() => {
                Ok(ImageAsset::new(blob.mime_type.clone(), blob.data.clone()))
            }
            _ => Err(ServiceError::malformed(format!(
                "no image in response (finish reason {:?}){}",
                response.finish_reason(),
                describe_text(&response.text())
            ))),
        }
    }
}

fn describe_text(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        String::new()
    } else {
        let preview: String = text.chars().take(200).collect();
        format!(": {preview}")
    }
}
