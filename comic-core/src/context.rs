//! Bounded window of recently rendered panels, used to keep the art consistent.
//!
//! Entries are kept in render order and evicted oldest-first. Nothing here
//! tracks individual characters; the window only biases the next render.

use crate::comic::{ImageAsset, PanelDescriptor, RenderedPanel};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// Default number of panels kept as context.
pub const DEFAULT_WINDOW_SIZE: usize = 2;

/// One remembered panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextEntry {
    pub index: usize,
    pub scene: String,
    pub characters: BTreeSet<String>,
    pub mood: String,
    pub image: ImageAsset,
}

impl ContextEntry {
    fn from_panel(panel: &RenderedPanel) -> Self {
        Self {
            index: panel.descriptor.index,
            scene: panel.descriptor.scene.clone(),
            characters: panel.descriptor.characters.clone(),
            mood: panel.descriptor.mood.clone(),
            image: panel.image.clone(),
        }
    }
}

/// Read-only snapshot handed to the renderer for one panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPayload {
    /// Index of the panel about to be rendered.
    pub next_index: usize,
    /// Recent panels, oldest first.
    pub recent: Vec<ContextEntry>,
}

impl ContextPayload {
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Characters of `next` that also appear in the recent panels.
    pub fn recurring_characters(&self, next: &PanelDescriptor) -> BTreeSet<String> {
        self.recent
            .iter()
            .flat_map(|entry| entry.characters.intersection(&next.characters))
            .cloned()
            .collect()
    }

    /// Reference images, oldest first.
    pub fn images(&self) -> Vec<ImageAsset> {
        self.recent.iter().map(|entry| entry.image.clone()).collect()
    }

    /// Describe the recent panels for the image prompt.
    pub fn describe(&self) -> String {
        let mut text = String::new();
        for entry in &self.recent {
            let characters = if entry.characters.is_empty() {
                "no named characters".to_string()
            } else {
                entry
                    .characters
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            text.push_str(&format!(
                "- Panel {}: {} (characters: {}; mood: {})\n",
                entry.index + 1,
                entry.scene,
                characters,
                entry.mood
            ));
        }
        text
    }
}

/// FIFO window over the most recent renders.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    entries: VecDeque<ContextEntry>,
    max_size: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl ContextWindow {
    /// Create a window holding at most `max_size` panels (at least 1).
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Snapshot of the window for rendering `next`.
    pub fn context_for(&self, next: &PanelDescriptor) -> ContextPayload {
        ContextPayload {
            next_index: next.index,
            recent: self.entries.iter().cloned().collect(),
        }
    }

    /// Append a successful render, evicting the oldest entries beyond the limit.
    pub fn record(&mut self, panel: &RenderedPanel) {
        self.entries.push_back(ContextEntry::from_panel(panel));
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Indices currently held, oldest first.
    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.index).collect()
    }
}
