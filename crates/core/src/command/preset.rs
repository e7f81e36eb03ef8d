//! Preset tier resolution.
//!
//! The token emitted for `-preset` depends on both the requested speed tier
//! and the preset vocabulary of the selected video encoder. Resolution is a
//! plain table lookup; a missing entry means the flag is omitted.

use serde::{Deserialize, Serialize};

use super::types::CodecFamily;

/// Requested encoding speed, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetTier {
    UltraFast,
    SuperFast,
    VeryFast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    VerySlow,
    Placebo,
}

impl PresetTier {
    /// All tiers from fastest to slowest.
    pub const ALL: [PresetTier; 10] = [
        Self::UltraFast,
        Self::SuperFast,
        Self::VeryFast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::VerySlow,
        Self::Placebo,
    ];

    /// The fastest available tier.
    pub const FASTEST: PresetTier = Self::UltraFast;

    /// The slowest available tier.
    pub const SLOWEST: PresetTier = Self::Placebo;
}

impl std::str::FromStr for PresetTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace(['-', '_'], "");
        Self::ALL
            .iter()
            .copied()
            .find(|tier| resolve_preset(*tier, CodecFamily::Software) == Some(normalized.as_str()))
            .ok_or_else(|| format!("unknown preset tier: {}", s))
    }
}

type PresetRow = (PresetTier, CodecFamily, &'static str);

const PRESET_TABLE: &[PresetRow] = &[
    // x264 / x265
    (PresetTier::UltraFast, CodecFamily::Software, "ultrafast"),
    (PresetTier::SuperFast, CodecFamily::Software, "superfast"),
    (PresetTier::VeryFast, CodecFamily::Software, "veryfast"),
    (PresetTier::Faster, CodecFamily::Software, "faster"),
    (PresetTier::Fast, CodecFamily::Software, "fast"),
    (PresetTier::Medium, CodecFamily::Software, "medium"),
    (PresetTier::Slow, CodecFamily::Software, "slow"),
    (PresetTier::Slower, CodecFamily::Software, "slower"),
    (PresetTier::VerySlow, CodecFamily::Software, "veryslow"),
    (PresetTier::Placebo, CodecFamily::Software, "placebo"),
    // NVENC p1 (fastest) .. p7 (slowest)
    (PresetTier::UltraFast, CodecFamily::Nvenc, "p1"),
    (PresetTier::SuperFast, CodecFamily::Nvenc, "p1"),
    (PresetTier::VeryFast, CodecFamily::Nvenc, "p2"),
    (PresetTier::Faster, CodecFamily::Nvenc, "p3"),
    (PresetTier::Fast, CodecFamily::Nvenc, "p3"),
    (PresetTier::Medium, CodecFamily::Nvenc, "p4"),
    (PresetTier::Slow, CodecFamily::Nvenc, "p5"),
    (PresetTier::Slower, CodecFamily::Nvenc, "p6"),
    (PresetTier::VerySlow, CodecFamily::Nvenc, "p7"),
    // Quick Sync
    (PresetTier::VeryFast, CodecFamily::Qsv, "veryfast"),
    (PresetTier::Faster, CodecFamily::Qsv, "faster"),
    (PresetTier::Fast, CodecFamily::Qsv, "fast"),
    (PresetTier::Medium, CodecFamily::Qsv, "medium"),
    (PresetTier::Slow, CodecFamily::Qsv, "slow"),
    (PresetTier::Slower, CodecFamily::Qsv, "slower"),
    (PresetTier::VerySlow, CodecFamily::Qsv, "veryslow"),
    // AMF quality presets
    (PresetTier::UltraFast, CodecFamily::Amf, "speed"),
    (PresetTier::SuperFast, CodecFamily::Amf, "speed"),
    (PresetTier::VeryFast, CodecFamily::Amf, "speed"),
    (PresetTier::Faster, CodecFamily::Amf, "balanced"),
    (PresetTier::Fast, CodecFamily::Amf, "balanced"),
    (PresetTier::Medium, CodecFamily::Amf, "balanced"),
    (PresetTier::Slow, CodecFamily::Amf, "quality"),
    (PresetTier::Slower, CodecFamily::Amf, "quality"),
    (PresetTier::VerySlow, CodecFamily::Amf, "quality"),
    (PresetTier::Placebo, CodecFamily::Amf, "quality"),
];

/// Looks up the preset token for a (tier, family) pair.
///
/// Returns `None` when the combination is unmapped, which callers treat as
/// "emit no preset flag".
pub fn resolve_preset(tier: PresetTier, family: CodecFamily) -> Option<&'static str> {
    PRESET_TABLE
        .iter()
        .find(|(t, f, _)| *t == tier && *f == family)
        .map(|(_, _, token)| *token)
}
