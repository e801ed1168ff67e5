//! Data produced by the pipeline: concept material, panel script, rendered panels.

use crate::request::GenerationRequest;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Normalized text the script is written from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptMaterial {
    pub summary: String,
    /// Key concepts in order of importance. Empty for plain topics.
    pub concepts: Vec<String>,
}

impl ConceptMaterial {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            concepts: Vec::new(),
        }
    }

    pub fn with_concepts(mut self, concepts: Vec<String>) -> Self {
        self.concepts = concepts;
        self
    }
}

/// One planned panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelDescriptor {
    /// 0-based position across the whole comic.
    pub index: usize,
    /// 1-based page number.
    pub page: u8,
    pub scene: String,
    /// Dialogue or caption lettered into the panel.
    pub caption: String,
    pub characters: BTreeSet<String>,
    pub mood: String,
}

/// An encoded image (PNG, JPEG, ...). Cloning shares the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    mime_type: String,
    data: Arc<[u8]>,
}

impl ImageAsset {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File extension matching the mime type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

// Images serialize as metadata only; the bytes travel separately.
impl Serialize for ImageAsset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ImageAsset", 2)?;
        state.serialize_field("mime_type", &self.mime_type)?;
        state.serialize_field("bytes", &self.data.len())?;
        state.end()
    }
}

/// A panel that rendered successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPanel {
    pub descriptor: PanelDescriptor,
    pub image: ImageAsset,
    /// Attempts used, including the successful one.
    pub render_attempts: u32,
}

/// The finished comic.
#[derive(Debug, Clone, Serialize)]
pub struct ComicResult {
    pub title: String,
    pub panels: Vec<RenderedPanel>,
    pub request: GenerationRequest,
    /// Panels left out in partial mode. Always empty otherwise.
    pub skipped_panels: Vec<usize>,
}

impl ComicResult {
    pub fn is_partial(&self) -> bool {
        !self.skipped_panels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Panels belonging to one page, in order.
    pub fn page(&self, page: u8) -> impl Iterator<Item = &RenderedPanel> {
        self.panels.iter().filter(move |p| p.descriptor.page == page)
    }
}
