//! Script planning: concept material in, ordered panel descriptors out.

use crate::audience::AudienceProfile;
use crate::comic::{ConceptMaterial, PanelDescriptor};
use crate::error::ComicError;
use crate::services::{with_timeout, TextGenerator, TextPrompt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Concept material beyond this many characters is cut before prompting.
pub const MAX_CONTENT_CHARS: usize = 4_000;

/// A validated panel script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    pub title: String,
    pub panels: Vec<PanelDescriptor>,
}

/// Writes the panel script through the text collaborator.
pub struct ScriptPlanner {
    text: Arc<dyn TextGenerator>,
    call_timeout: Duration,
}

impl ScriptPlanner {
    pub fn new(text: Arc<dyn TextGenerator>, call_timeout: Duration) -> Self {
        Self { text, call_timeout }
    }

    /// Plan exactly `page_count * panels_per_page` panels.
    ///
    /// Wrong panel counts and missing fields fail with
    /// [`ComicError::ScriptGeneration`]; nothing is padded or truncated.
    pub async fn plan(
        &self,
        material: &ConceptMaterial,
        profile: &AudienceProfile,
        page_count: u8,
        theme: Option<&str>,
    ) -> Result<Script, ComicError> {
        let prompt = build_prompt(material, profile, page_count, theme);
        tracing::debug!(chars = prompt.prompt.len(), "requesting script");

        let response = with_timeout(self.call_timeout, self.text.generate_text(prompt)).await?;
        let script = parse_script(&response, profile, page_count)?;

        tracing::info!(title = %script.title, panels = script.panels.len(), "script planned");
        Ok(script)
    }
}

/// Build the script-writing prompt.
pub fn build_prompt(
    material: &ConceptMaterial,
    profile: &AudienceProfile,
    page_count: u8,
    theme: Option<&str>,
) -> TextPrompt {
    let total = profile.panel_count(page_count);
    let theme = theme.unwrap_or("the main idea of the content below");

    let mut prompt = format!(
        "Create a {page_count}-page educational comic for ages {age} explaining: {theme}.\n\n\
         CONTENT:\n{content}\n",
        age = profile.band.age_label(),
        content = truncate_chars(&material.summary, MAX_CONTENT_CHARS),
    );

    if !material.concepts.is_empty() {
        prompt.push_str("\nKEY CONCEPTS (most important first):\n");
        for concept in &material.concepts {
            prompt.push_str(&format!("- {concept}\n"));
        }
    }

    prompt.push_str(&format!(
        "\nAUDIENCE:\n\
         - Vocabulary: {vocabulary}\n\
         - Tone: {tone}\n\
         - Pacing: {pacing}\n\
         - Art style: {style}\n\n\
         RULES:\n\
         - Write exactly {total} panels, {per_page} per page, over {page_count} page(s).\n\
         - Number panels with \"index\" from 0 to {last} in reading order; \"page\" runs from 1 to {page_count}.\n\
         - Page 1 must introduce the topic clearly.\n\
         - The final page must end with a summary or \"Lesson Learned\".\n\
         - Keep the science accurate and the content age-appropriate.\n\
         - Reuse the same named characters across panels where it makes sense.\n\n\
         Respond with JSON only, in this format:\n\
         {{\"title\": \"...\", \"panels\": [{{\"index\": 0, \"page\": 1, \"scene\": \"what is drawn\", \
         \"caption\": \"dialogue or caption text\", \"characters\": [\"Name\"], \"mood\": \"...\"}}]}}",
        vocabulary = profile.vocabulary_level,
        tone = profile.tone,
        pacing = profile.pacing,
        style = profile.art_style,
        per_page = profile.panels_per_page,
        last = total.saturating_sub(1),
    ));

    TextPrompt::new(prompt)
        .with_system(profile.role)
        .with_temperature(0.8)
        .json()
}

#[derive(Debug, Deserialize)]
struct RawScript {
    #[serde(default)]
    title: Option<String>,
    panels: Vec<RawPanel>,
}

#[derive(Debug, Deserialize)]
struct RawPanel {
    index: Option<usize>,
    page: Option<u8>,
    scene: Option<String>,
    #[serde(alias = "dialogue")]
    caption: Option<String>,
    #[serde(default)]
    characters: Vec<String>,
    mood: Option<String>,
}

/// Parse and validate a script response.
pub fn parse_script(
    text: &str,
    profile: &AudienceProfile,
    page_count: u8,
) -> Result<Script, ComicError> {
    let raw: RawScript = serde_json::from_str(extract_json(text))
        .map_err(|e| ComicError::script(format!("response is not a valid script: {e}")))?;

    let expected = profile.panel_count(page_count);
    if raw.panels.len() != expected {
        return Err(ComicError::script(format!(
            "expected {expected} panels, got {}",
            raw.panels.len()
        )));
    }

    let per_page = profile.panels_per_page.max(1);
    let mut panels = Vec::with_capacity(expected);
    for (position, panel) in raw.panels.into_iter().enumerate() {
        let index = panel
            .index
            .ok_or_else(|| ComicError::script(format!("panel at position {position} has no index")))?;
        if index != position {
            return Err(ComicError::script(format!(
                "panel indices must be contiguous from 0: expected {position}, got {index}"
            )));
        }

        let page = panel
            .page
            .ok_or_else(|| ComicError::script(format!("panel {index} has no page")))?;
        // Every page holds exactly `per_page` panels, filled in order.
        let expected_page = index / per_page + 1;
        if usize::from(page) != expected_page {
            return Err(ComicError::script(format!(
                "panel {index} is on page {page}, expected page {expected_page} \
                 ({per_page} panels per page over {page_count} pages)"
            )));
        }

        panels.push(PanelDescriptor {
            index,
            page,
            scene: required(panel.scene, "scene", index)?,
            caption: required(panel.caption, "caption", index)?,
            characters: panel
                .characters
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            mood: required(panel.mood, "mood", index)?,
        });
    }

    let title = raw
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    Ok(Script { title, panels })
}

fn required(value: Option<String>, field: &str, index: usize) -> Result<String, ComicError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ComicError::script(format!("panel {index} is missing {field}")))
}

/// Extract JSON from a response that might be wrapped in a markdown code block.
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

/// The first `max_chars` characters of `text`.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
