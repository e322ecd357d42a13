//! Effect selection and intensity.

use serde::{Deserialize, Serialize};

/// The named per-frame effects.
///
/// Parsing is lossy: anything unrecognised selects [`EffectId::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "String")]
pub enum EffectId {
    #[default]
    None,
    Grayscale,
    Sepia,
    /// Sepia followed by a contrast boost, with a vignette overlay.
    Vintage,
    Invert,
    /// Chromatic shift: red pulled from the left, blue from the right.
    RgbSplit,
    /// Darkened every third row, with vignette and grain overlays.
    Scanlines,
}

impl EffectId {
    pub const ALL: [EffectId; 7] = [
        EffectId::None,
        EffectId::Grayscale,
        EffectId::Sepia,
        EffectId::Vintage,
        EffectId::Invert,
        EffectId::RgbSplit,
        EffectId::Scanlines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectId::None => "none",
            EffectId::Grayscale => "grayscale",
            EffectId::Sepia => "sepia",
            EffectId::Vintage => "vintage",
            EffectId::Invert => "invert",
            EffectId::RgbSplit => "rgbSplit",
            EffectId::Scanlines => "scanlines",
        }
    }

    /// Parse an effect id, accepting `rgbSplit`, `rgb-split` and `rgb_split`
    /// spellings case-insensitively. Unknown ids map to `None`.
    pub fn parse_lossy(text: &str) -> Self {
        let normalized: String = text
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "grayscale" | "greyscale" => EffectId::Grayscale,
            "sepia" => EffectId::Sepia,
            "vintage" => EffectId::Vintage,
            "invert" => EffectId::Invert,
            "rgbsplit" => EffectId::RgbSplit,
            "scanlines" => EffectId::Scanlines,
            _ => EffectId::None,
        }
    }

    /// Whether the overlay stage draws a vignette for this effect.
    pub fn has_vignette(&self) -> bool {
        matches!(self, EffectId::Vintage | EffectId::Scanlines)
    }

    /// Whether the overlay stage draws grain for this effect.
    pub fn has_grain(&self) -> bool {
        matches!(self, EffectId::Scanlines)
    }
}

impl From<String> for EffectId {
    fn from(value: String) -> Self {
        Self::parse_lossy(&value)
    }
}

impl std::str::FromStr for EffectId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lossy(s))
    }
}

impl std::fmt::Display for EffectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Blend factor in `[0, 1]`. Only constructible through clamping.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f32")]
pub struct Intensity(f32);

impl Intensity {
    pub const ZERO: Intensity = Intensity(0.0);
    pub const FULL: Intensity = Intensity(1.0);

    /// Clamp into `[0, 1]`; NaN becomes 0.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    /// Parse free-form slider/text input. Unparsable input becomes 0.
    pub fn parse_lossy(text: &str) -> Self {
        text.trim()
            .parse::<f32>()
            .map(Self::new)
            .unwrap_or(Self::ZERO)
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl From<f32> for Intensity {
    fn from(value: f32) -> Self {
        Self::new(value)
    }
}

/// The effect settings read by the render loop on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectConfig {
    pub effect: EffectId,
    pub intensity: Intensity,
}

impl EffectConfig {
    pub fn new(effect: EffectId, intensity: f32) -> Self {
        Self {
            effect,
            intensity: Intensity::new(intensity),
        }
    }

    /// Build from raw UI values without any prior validation.
    pub fn from_text(effect: &str, intensity: &str) -> Self {
        Self {
            effect: EffectId::parse_lossy(effect),
            intensity: Intensity::parse_lossy(intensity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_effect_is_none() {
        assert_eq!(EffectId::parse_lossy("posterize"), EffectId::None);
        assert_eq!(EffectId::parse_lossy(""), EffectId::None);
    }

    #[test]
    fn parses_rgb_split_spellings() {
        for text in ["rgbSplit", "rgb-split", "RGB_SPLIT", " rgbsplit "] {
            assert_eq!(EffectId::parse_lossy(text), EffectId::RgbSplit, "{text}");
        }
    }

    #[test]
    fn round_trips_every_id_through_its_name() {
        for id in EffectId::ALL {
            assert_eq!(EffectId::parse_lossy(id.as_str()), id);
        }
    }

    #[test]
    fn intensity_is_clamped() {
        assert_eq!(Intensity::new(1.7).get(), 1.0);
        assert_eq!(Intensity::new(-0.2).get(), 0.0);
        assert_eq!(Intensity::new(f32::NAN).get(), 0.0);
        assert_eq!(Intensity::new(f32::INFINITY).get(), 1.0);
    }

    #[test]
    fn intensity_parses_free_text() {
        assert_eq!(Intensity::parse_lossy(" 0.25 ").get(), 0.25);
        assert_eq!(Intensity::parse_lossy("12").get(), 1.0);
        assert_eq!(Intensity::parse_lossy("loud").get(), 0.0);
    }

    #[test]
    fn serde_uses_camel_case_ids_and_clamps() {
        let config: EffectConfig =
            serde_json::from_str(r#"{"effect":"rgbSplit","intensity":4.0}"#).unwrap();
        assert_eq!(config.effect, EffectId::RgbSplit);
        assert_eq!(config.intensity, Intensity::FULL);

        let json = serde_json::to_string(&EffectConfig::new(EffectId::RgbSplit, 0.5)).unwrap();
        assert!(json.contains("\"rgbSplit\""));

        let unknown: EffectConfig =
            serde_json::from_str(r#"{"effect":"mystery","intensity":0.5}"#).unwrap();
        assert_eq!(unknown.effect, EffectId::None);
    }
}
