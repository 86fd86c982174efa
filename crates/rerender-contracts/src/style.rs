use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Six-field "visual DNA" decoded from a reference image.
///
/// Every field is required on deserialization; a payload that omits one is
/// rejected rather than partially filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleMetadata {
    pub art_style: String,
    pub outfit_details: String,
    pub pose_and_gestures: String,
    pub background_elements: String,
    pub lighting_and_color: String,
    pub composition: String,
}

impl StyleMetadata {
    pub const FIELD_NAMES: [&'static str; 6] = [
        "artStyle",
        "outfitDetails",
        "poseAndGestures",
        "backgroundElements",
        "lightingAndColor",
        "composition",
    ];

    /// `(field name, value)` pairs in schema order.
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            (Self::FIELD_NAMES[0], self.art_style.as_str()),
            (Self::FIELD_NAMES[1], self.outfit_details.as_str()),
            (Self::FIELD_NAMES[2], self.pose_and_gestures.as_str()),
            (Self::FIELD_NAMES[3], self.background_elements.as_str()),
            (Self::FIELD_NAMES[4], self.lighting_and_color.as_str()),
            (Self::FIELD_NAMES[5], self.composition.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FidelityMode {
    #[serde(rename = "HARD")]
    Hard,
    #[default]
    #[serde(rename = "REALISTIC")]
    Realistic,
}

impl FidelityMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "HARD",
            Self::Realistic => "REALISTIC",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Hard => "Hard Style",
            Self::Realistic => "Realistic Blend",
        }
    }
}

impl fmt::Display for FidelityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FidelityMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hard" | "hard style" | "hard_style" => Ok(Self::Hard),
            "realistic" | "realistic blend" | "realistic_blend" => Ok(Self::Realistic),
            other => Err(format!(
                "unknown fidelity mode '{other}' (expected hard or realistic)"
            )),
        }
    }
}

/// Output ratio selection. `Auto` means "infer from the reference image".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "AUTO")]
    Auto,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "16:9")]
    Landscape16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 6] = [
        Self::Auto,
        Self::Square,
        Self::Portrait3x4,
        Self::Landscape4x3,
        Self::Portrait9x16,
        Self::Landscape16x9,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Square => "1:1",
            Self::Portrait3x4 => "3:4",
            Self::Landscape4x3 => "4:3",
            Self::Portrait9x16 => "9:16",
            Self::Landscape16x9 => "16:9",
        }
    }

    pub fn is_auto(self) -> bool {
        self == Self::Auto
    }

    /// `(width, height)` terms of the ratio; `None` for `Auto`.
    pub fn terms(self) -> Option<(u32, u32)> {
        match self {
            Self::Auto => None,
            Self::Square => Some((1, 1)),
            Self::Portrait3x4 => Some((3, 4)),
            Self::Landscape4x3 => Some((4, 3)),
            Self::Portrait9x16 => Some((9, 16)),
            Self::Landscape16x9 => Some((16, 9)),
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| {
                format!("unknown aspect ratio '{normalized}' (expected auto, 1:1, 3:4, 4:3, 9:16 or 16:9)")
            })
    }
}
