//! Source normalization: topics and videos become concept material.

use crate::audience::AudienceBand;
use crate::cancel::CancellationToken;
use crate::comic::ConceptMaterial;
use crate::error::{ComicError, ServiceError};
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::request::SourceKind;
use crate::script::{extract_json, truncate_chars};
use crate::services::{with_timeout, MediaFetcher, Services, SpeechToText, TextGenerator, TextPrompt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Transcripts beyond this many characters are cut before concept extraction.
pub const MAX_TRANSCRIPT_CHARS: usize = 10_000;

/// Most concepts kept from one extraction.
pub const MAX_CONCEPTS: usize = 8;

/// Turns a request's source into [`ConceptMaterial`].
pub struct SourceNormalizer {
    media: Arc<dyn MediaFetcher>,
    speech: Arc<dyn SpeechToText>,
    text: Arc<dyn TextGenerator>,
    call_timeout: Duration,
}

impl SourceNormalizer {
    pub fn new(services: &Services, call_timeout: Duration) -> Self {
        Self {
            media: Arc::clone(&services.media),
            speech: Arc::clone(&services.speech),
            text: Arc::clone(&services.text),
            call_timeout,
        }
    }

    /// Normalize one source. Topics are used verbatim; videos are
    /// downloaded, transcribed and condensed.
    pub async fn normalize(
        &self,
        kind: SourceKind,
        value: &str,
        band: AudienceBand,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ConceptMaterial, ComicError> {
        match kind {
            SourceKind::Topic => Ok(ConceptMaterial::new(value)),
            SourceKind::Video => self.normalize_video(value, band, sink, cancel).await,
        }
    }

    async fn normalize_video(
        &self,
        reference: &str,
        band: AudienceBand,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<ConceptMaterial, ComicError> {
        sink.emit(ProgressEvent::new(Stage::Normalizing, "fetching media"));

        // Removed when dropped, on every path out of this function.
        let scratch = tempfile::Builder::new()
            .prefix("comic-media-")
            .tempdir()
            .map_err(|e| ComicError::MediaFetch {
                reference: reference.to_string(),
                source: ServiceError::config(format!("cannot create scratch directory: {e}")),
            })?;

        let audio = with_timeout(
            self.call_timeout,
            self.media.fetch_audio(reference, scratch.path()),
        )
        .await
        .map_err(|source| ComicError::MediaFetch {
            reference: reference.to_string(),
            source,
        })?;
        tracing::debug!(audio = %audio.display(), "media fetched");

        cancel.check()?;
        sink.emit(ProgressEvent::new(Stage::Normalizing, "transcribing"));

        let transcript = with_timeout(self.call_timeout, self.speech.transcribe(&audio))
            .await
            .map_err(|source| ComicError::Transcription { source })?;
        drop(scratch);

        if transcript.trim().is_empty() {
            return Err(ComicError::Transcription {
                source: ServiceError::malformed("transcript is empty"),
            });
        }
        tracing::debug!(chars = transcript.len(), "transcribed");

        cancel.check()?;
        sink.emit(ProgressEvent::new(Stage::Normalizing, "extracting concepts"));

        let prompt = extraction_prompt(&transcript, band);
        let response = with_timeout(self.call_timeout, self.text.generate_text(prompt)).await?;
        let material = parse_extraction(&response)?;

        tracing::info!(concepts = material.concepts.len(), "concepts extracted");
        Ok(material)
    }
}

fn extraction_prompt(transcript: &str, band: AudienceBand) -> TextPrompt {
    let prompt = format!(
        "Below is the transcript of an educational video. Summarize what it teaches \
         in a few paragraphs a writer could turn into a comic for ages {age}, and list \
         at most {MAX_CONCEPTS} key concepts, most important first.\n\n\
         Respond with JSON only: {{\"summary\": \"...\", \"concepts\": [\"...\"]}}\n\n\
         TRANSCRIPT:\n{transcript}",
        age = band.age_label(),
        transcript = truncate_chars(transcript, MAX_TRANSCRIPT_CHARS),
    );

    TextPrompt::new(prompt)
        .with_system("You condense lecture transcripts into accurate teaching notes.")
        .with_temperature(0.2)
        .json()
}

#[derive(Debug, Deserialize)]
struct Extraction {
    summary: String,
    #[serde(default)]
    concepts: Vec<String>,
}

fn parse_extraction(text: &str) -> Result<ConceptMaterial, ServiceError> {
    let extraction: Extraction = serde_json::from_str(extract_json(text))
        .map_err(|e| ServiceError::malformed(format!("concept extraction is not valid JSON: {e}")))?;

    let summary = extraction.summary.trim();
    if summary.is_empty() {
        return Err(ServiceError::malformed("concept extraction has an empty summary"));
    }

    let concepts = extraction
        .concepts
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .take(MAX_CONCEPTS)
        .collect();

    Ok(ConceptMaterial::new(summary).with_concepts(concepts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extraction_bounds_concepts() {
        let concepts: Vec<String> = (0..12).map(|i| format!("\"c{i}\"")).collect();
        let text = format!(
            "```json\n{{\"summary\": \" Plants eat light. \", \"concepts\": [{}, \"  \"]}}\n```",
            concepts.join(",")
        );

        let material = parse_extraction(&text).unwrap();
        assert_eq!(material.summary, "Plants eat light.");
        assert_eq!(material.concepts.len(), MAX_CONCEPTS);
        assert_eq!(material.concepts[0], "c0");
    }

    #[test]
    fn test_parse_extraction_rejects_garbage() {
        assert!(parse_extraction("no json here").is_err());
        assert!(parse_extraction(r#"{"summary": "", "concepts": []}"#).is_err());
    }

    #[test]
    fn test_extraction_prompt_truncates_transcript() {
        let transcript = "y".repeat(MAX_TRANSCRIPT_CHARS + 50);
        let prompt = extraction_prompt(&transcript, AudienceBand::Toddler);
        assert!(prompt.json);
        assert!(prompt.prompt.contains("ages 2-5"));
        assert!(!prompt.prompt.contains(&"y".repeat(MAX_TRANSCRIPT_CHARS + 1)));
    }
}
