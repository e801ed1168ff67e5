//! Audience bands and their fixed profiles.

use crate::error::ComicError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Age group the comic is written and drawn for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceBand {
    /// Ages 2-5.
    Toddler,
    /// Ages 6-10.
    Kid,
    /// Ages 11 and up.
    Teen,
}

impl AudienceBand {
    pub const ALL: [AudienceBand; 3] = [AudienceBand::Toddler, AudienceBand::Kid, AudienceBand::Teen];

    pub fn name(&self) -> &'static str {
        match self {
            AudienceBand::Toddler => "toddler",
            AudienceBand::Kid => "kid",
            AudienceBand::Teen => "teen",
        }
    }

    /// Age range label, e.g. "6-10".
    pub fn age_label(&self) -> &'static str {
        match self {
            AudienceBand::Toddler => "2-5",
            AudienceBand::Kid => "6-10",
            AudienceBand::Teen => "11+",
        }
    }
}

impl fmt::Display for AudienceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AudienceBand {
    type Err = ComicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "toddler" | "2-5" => Ok(AudienceBand::Toddler),
            "kid" | "6-10" => Ok(AudienceBand::Kid),
            "teen" | "11+" => Ok(AudienceBand::Teen),
            _ => Err(ComicError::UnknownAudienceBand(s.to_string())),
        }
    }
}

/// Writing and drawing constraints for one audience band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudienceProfile {
    pub band: AudienceBand,
    /// Persona the script writer is asked to adopt.
    pub role: &'static str,
    pub vocabulary_level: &'static str,
    pub tone: &'static str,
    pub pacing: &'static str,
    pub art_style: &'static str,
    pub panels_per_page: usize,
}

const TODDLER: AudienceProfile = AudienceProfile {
    band: AudienceBand::Toddler,
    role: "You are an illustrator for nursery rhymes and toddler picture books.",
    vocabulary_level: "Very simple, short, repetitive words a toddler already knows.",
    tone: "Joyous, musical and gentle. No scary elements.",
    pacing: "Very slow: one idea per page, big uncluttered panels.",
    art_style: "Bright primary colors, cute flat vector art with thick outlines, \
                rounded friendly characters (animals or soft shapes).",
    panels_per_page: 2,
};

const KID: AudienceProfile = AudienceProfile {
    band: AudienceBand::Kid,
    role: "You are a creator of popular Saturday morning cartoons.",
    vocabulary_level: "Everyday words with a fun-fact tone; explain any new term right away.",
    tone: "Fun, adventurous and exciting, with jokes and fun facts.",
    pacing: "Dynamic: something happens in every panel.",
    art_style: "Vibrant, energetic cartoon style with dynamic poses and expressive faces. \
                Relatable kid characters or superheroes.",
    panels_per_page: 4,
};

const TEEN: AudienceProfile = AudienceProfile {
    band: AudienceBand::Teen,
    role: "You are a professional manga artist.",
    vocabulary_level: "Witty dialogue; precise terminology is welcome when it is explained.",
    tone: "Witty, cool, intellectual but accessible.",
    pacing: "Cinematic: establishing shots, close-ups and reveals.",
    art_style: "High-quality manga/anime style with detailed backgrounds and screen tones.",
    panels_per_page: 6,
};

/// Look up the profile for a band. Pure: the same band always yields the same profile.
pub fn resolve(band: AudienceBand) -> AudienceProfile {
    match band {
        AudienceBand::Toddler => TODDLER,
        AudienceBand::Kid => KID,
        AudienceBand::Teen => TEEN,
    }
}

/// Parse a band name or age label and look up its profile.
pub fn resolve_str(band: &str) -> Result<AudienceProfile, ComicError> {
    band.parse().map(resolve)
}

impl AudienceProfile {
    /// Total panels for a comic of `page_count` pages.
    pub fn panel_count(&self, page_count: u8) -> usize {
        usize::from(page_count) * self.panels_per_page
    }
}
