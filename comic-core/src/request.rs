//! Generation requests.

use crate::audience::AudienceBand;
use crate::error::ComicError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Smallest accepted page count.
pub const MIN_PAGES: u8 = 1;

/// Largest accepted page count.
pub const MAX_PAGES: u8 = 5;

/// Where the concept material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A free-text topic, used verbatim.
    Topic,
    /// A video reference (URL) whose audio is transcribed.
    Video,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Topic => "topic",
            SourceKind::Video => "video",
        })
    }
}

impl FromStr for SourceKind {
    type Err = ComicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "topic" | "text" => Ok(SourceKind::Topic),
            "video" | "youtube" => Ok(SourceKind::Video),
            _ => Err(ComicError::UnsupportedSource(s.to_string())),
        }
    }
}

/// An accepted request for one comic. Validated on construction, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    id: Uuid,
    source_kind: SourceKind,
    source_value: String,
    audience_band: AudienceBand,
    page_count: u8,
    theme: Option<String>,
}

impl GenerationRequest {
    /// Validate and accept a request.
    pub fn new(
        source_kind: SourceKind,
        source_value: impl Into<String>,
        audience_band: AudienceBand,
        page_count: u8,
    ) -> Result<Self, ComicError> {
        let source_value = source_value.into().trim().to_string();
        if source_value.is_empty() {
            return Err(ComicError::InvalidRequest(format!(
                "{source_kind} source must not be empty"
            )));
        }
        if !(MIN_PAGES..=MAX_PAGES).contains(&page_count) {
            return Err(ComicError::InvalidRequest(format!(
                "page count must be between {MIN_PAGES} and {MAX_PAGES}, got {page_count}"
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            source_kind,
            source_value,
            audience_band,
            page_count,
            theme: None,
        })
    }

    /// A request explaining a free-text topic.
    pub fn topic(
        topic: impl Into<String>,
        audience_band: AudienceBand,
        page_count: u8,
    ) -> Result<Self, ComicError> {
        Self::new(SourceKind::Topic, topic, audience_band, page_count)
    }

    /// A request built from a video's transcript.
    pub fn video(
        reference: impl Into<String>,
        audience_band: AudienceBand,
        page_count: u8,
    ) -> Result<Self, ComicError> {
        Self::new(SourceKind::Video, reference, audience_band, page_count)
    }

    /// Parse the source kind and band from strings, as a submission interface receives them.
    pub fn parse(
        source_kind: &str,
        source_value: impl Into<String>,
        audience_band: &str,
        page_count: u8,
    ) -> Result<Self, ComicError> {
        Self::new(
            source_kind.parse()?,
            source_value,
            audience_band.parse()?,
            page_count,
        )
    }

    /// Name the concept to explain. Blank themes are ignored.
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        let theme = theme.into().trim().to_string();
        self.theme = (!theme.is_empty()).then_some(theme);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn source_value(&self) -> &str {
        &self.source_value
    }

    pub fn audience_band(&self) -> AudienceBand {
        self.audience_band
    }

    pub fn page_count(&self) -> u8 {
        self.page_count
    }

    /// The concept the comic explains: the explicit theme, or the topic text itself.
    pub fn theme(&self) -> Option<&str> {
        match (&self.theme, self.source_kind) {
            (Some(theme), _) => Some(theme.as_str()),
            (None, SourceKind::Topic) => Some(self.source_value.as_str()),
            (None, SourceKind::Video) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_request() {
        let request = GenerationRequest::topic("  Photosynthesis ", AudienceBand::Kid, 1).unwrap();
        assert_eq!(request.source_kind(), SourceKind::Topic);
        assert_eq!(request.source_value(), "Photosynthesis");
        assert_eq!(request.theme(), Some("Photosynthesis"));
    }

    #[test]
    fn test_video_theme() {
        let request =
            GenerationRequest::video("https://youtu.be/abc", AudienceBand::Teen, 2).unwrap();
        assert_eq!(request.theme(), None);

        let request = request.with_theme("Black holes");
        assert_eq!(request.theme(), Some("Black holes"));
    }

    #[test]
    fn test_page_count_bounds() {
        for pages in [0, 6] {
            let err = GenerationRequest::topic("Gravity", AudienceBand::Kid, pages).unwrap_err();
            assert!(matches!(err, ComicError::InvalidRequest(_)));
        }
        assert!(GenerationRequest::topic("Gravity", AudienceBand::Kid, 5).is_ok());
    }

    #[test]
    fn test_empty_source() {
        let err = GenerationRequest::topic("   ", AudienceBand::Kid, 1).unwrap_err();
        assert!(matches!(err, ComicError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_unsupported_source() {
        let err = GenerationRequest::parse("podcast", "x", "kid", 1).unwrap_err();
        assert!(matches!(err, ComicError::UnsupportedSource(ref s) if s == "podcast"));

        let err = GenerationRequest::parse("topic", "x", "adult", 1).unwrap_err();
        assert!(matches!(err, ComicError::UnknownAudienceBand(_)));
    }

    #[test]
    fn test_requests_get_distinct_ids() {
        let a = GenerationRequest::topic("Rain", AudienceBand::Toddler, 1).unwrap();
        let b = GenerationRequest::topic("Rain", AudienceBand::Toddler, 1).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
