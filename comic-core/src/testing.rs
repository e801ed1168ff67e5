//! Testing utilities for the comic pipeline.
//!
//! This module provides scripted collaborators so pipeline runs are
//! deterministic and never touch the network or local tools:
//! - `ScriptedTextGenerator` returns queued responses in order
//! - `MockImageGenerator` fails or hangs chosen panels on chosen attempts
//! - `MockMediaFetcher` and `MockSpeechToText` stand in for yt-dlp and whisper
//! - `RecordingSink` captures progress events
//! - `MockServices` bundles the four doubles into [`Services`]

use crate::comic::{ImageAsset, PanelDescriptor};
use crate::error::ServiceError;
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::services::{
    ImageGenerator, ImagePrompt, MediaFetcher, Services, SpeechToText, TextGenerator, TextPrompt,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A text generator that returns scripted responses in order.
#[derive(Default)]
pub struct ScriptedTextGenerator {
    responses: Mutex<VecDeque<Result<String, ServiceError>>>,
    prompts: Mutex<Vec<TextPrompt>>,
}

impl ScriptedTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn respond(self, text: impl Into<String>) -> Self {
        lock(&self.responses).push_back(Ok(text.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: ServiceError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<TextPrompt> {
        lock(&self.prompts).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    async fn generate_text(&self, prompt: TextPrompt) -> Result<String, ServiceError> {
        lock(&self.prompts).push(prompt);
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::api("no scripted response left")))
    }
}

/// One call seen by [`MockImageGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCall {
    pub panel: usize,
    pub attempt: u32,
    pub prompt: String,
    /// Panel indices of the reference images, decoded from their bytes.
    pub reference_panels: Vec<usize>,
}

/// An image generator that draws one-byte "images" holding the panel index.
///
/// Chosen panels can fail or hang on their first attempts.
#[derive(Default)]
pub struct MockImageGenerator {
    failures: HashMap<usize, u32>,
    hangs: HashMap<usize, u32>,
    calls: Mutex<Vec<ImageCall>>,
}

impl MockImageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `attempts` attempts at `panel`.
    pub fn fail_first(mut self, panel: usize, attempts: u32) -> Self {
        self.failures.insert(panel, attempts);
        self
    }

    /// Never answer the first `attempts` attempts at `panel`.
    pub fn hang_first(mut self, panel: usize, attempts: u32) -> Self {
        self.hangs.insert(panel, attempts);
        self
    }

    /// Every call, in order.
    pub fn calls(&self) -> Vec<ImageCall> {
        lock(&self.calls).clone()
    }

    /// Attempts made at `panel`.
    pub fn attempts(&self, panel: usize) -> u32 {
        lock(&self.calls).iter().filter(|c| c.panel == panel).count() as u32
    }

    /// The image this generator draws for `panel`.
    pub fn image_for(panel: usize) -> ImageAsset {
        ImageAsset::new("image/png", vec![panel as u8])
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    async fn generate_image(&self, prompt: ImagePrompt) -> Result<ImageAsset, ServiceError> {
        let attempt = self.attempts(prompt.panel) + 1;
        lock(&self.calls).push(ImageCall {
            panel: prompt.panel,
            attempt,
            prompt: prompt.prompt.clone(),
            reference_panels: prompt
                .references
                .iter()
                .filter_map(|image| image.bytes().first().map(|b| usize::from(*b)))
                .collect(),
        });

        if attempt <= self.hangs.get(&prompt.panel).copied().unwrap_or(0) {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        if attempt <= self.failures.get(&prompt.panel).copied().unwrap_or(0) {
            return Err(ServiceError::api(format!(
                "scripted failure for panel {} attempt {attempt}",
                prompt.panel
            )));
        }
        Ok(Self::image_for(prompt.panel))
    }
}

/// A media fetcher that writes a fake mp3 into the scratch directory.
#[derive(Default)]
pub struct MockMediaFetcher {
    error: Option<ServiceError>,
    scratch_dirs: Mutex<Vec<PathBuf>>,
}

impl MockMediaFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Scratch directories handed to the fetcher.
    pub fn scratch_dirs(&self) -> Vec<PathBuf> {
        lock(&self.scratch_dirs).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.scratch_dirs).len()
    }
}

#[async_trait]
impl MediaFetcher for MockMediaFetcher {
    async fn fetch_audio(
        &self,
        _reference: &str,
        scratch_dir: &Path,
    ) -> Result<PathBuf, ServiceError> {
        lock(&self.scratch_dirs).push(scratch_dir.to_path_buf());
        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let audio = scratch_dir.join("audio.mp3");
        tokio::fs::write(&audio, b"ID3")
            .await
            .map_err(|e| ServiceError::process(e.to_string()))?;
        Ok(audio)
    }
}

/// A speech-to-text double with a fixed outcome.
pub struct MockSpeechToText {
    outcome: Result<String, ServiceError>,
    calls: Mutex<Vec<PathBuf>>,
}

impl MockSpeechToText {
    pub fn transcript(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            outcome: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Default for MockSpeechToText {
    fn default() -> Self {
        Self::transcript("Plants turn sunlight, water and air into sugar.")
    }
}

#[async_trait]
impl SpeechToText for MockSpeechToText {
    async fn transcribe(&self, audio: &Path) -> Result<String, ServiceError> {
        lock(&self.calls).push(audio.to_path_buf());
        self.outcome.clone()
    }
}

/// A sink that keeps every event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.message.clone()).collect()
    }

    /// Stages in emission order, consecutive duplicates removed.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages: Vec<Stage> = lock(&self.events).iter().map(|e| e.stage).collect();
        stages.dedup();
        stages
    }

    pub fn has_message(&self, message: &str) -> bool {
        lock(&self.events).iter().any(|e| e.message == message)
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        lock(&self.events).push(event);
    }
}

/// The four doubles, kept accessible for assertions after a run.
pub struct MockServices {
    pub media: Arc<MockMediaFetcher>,
    pub speech: Arc<MockSpeechToText>,
    pub text: Arc<ScriptedTextGenerator>,
    pub images: Arc<MockImageGenerator>,
}

impl MockServices {
    pub fn new(text: ScriptedTextGenerator, images: MockImageGenerator) -> Self {
        Self {
            media: Arc::new(MockMediaFetcher::new()),
            speech: Arc::new(MockSpeechToText::default()),
            text: Arc::new(text),
            images: Arc::new(images),
        }
    }

    pub fn with_media(mut self, media: MockMediaFetcher) -> Self {
        self.media = Arc::new(media);
        self
    }

    pub fn with_speech(mut self, speech: MockSpeechToText) -> Self {
        self.speech = Arc::new(speech);
        self
    }

    pub fn services(&self) -> Services {
        Services {
            media: self.media.clone(),
            speech: self.speech.clone(),
            text: self.text.clone(),
            images: self.images.clone(),
        }
    }
}

/// A well-formed script response with `count` panels spread over `pages` pages.
pub fn script_json(count: usize, pages: u8) -> String {
    let pages = usize::from(pages.max(1));
    let panels: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "index": i,
                "page": i * pages / count.max(1) + 1,
                "scene": format!("Leafy the plant in scene {i}"),
                "caption": format!("Caption {i}"),
                "characters": ["Leafy"],
                "mood": "cheerful",
            })
        })
        .collect();
    serde_json::json!({ "title": "Leafy's Sunny Lunch", "panels": panels }).to_string()
}

/// A concept extraction response.
pub fn extraction_json(summary: &str, concepts: &[&str]) -> String {
    serde_json::json!({ "summary": summary, "concepts": concepts }).to_string()
}

/// A descriptor on page 1 with the given characters.
pub fn descriptor(index: usize, characters: &[&str]) -> PanelDescriptor {
    PanelDescriptor {
        index,
        page: 1,
        scene: format!("scene {index}"),
        caption: format!("caption {index}"),
        characters: characters.iter().map(|c| c.to_string()).collect(),
        mood: "curious".to_string(),
    }
}
