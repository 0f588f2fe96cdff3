//! Export configuration for a single run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors raised while validating export settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("seconds per photo must be between {min} and {max}, got {value}")]
    SecondsOutOfRange { value: f64, min: f64, max: f64 },

    #[error("seconds per photo must be a multiple of {step}, got {value}")]
    SecondsOffStep { value: f64, step: f64 },

    #[error("unknown transition '{name}' (expected fade, slide, zoom, or none)")]
    UnknownTransition { name: String },
}

/// How one photo hands over to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// Cross-fade through opacity.
    #[default]
    Fade,
    /// Next photo pushes the current one out to the left.
    Slide,
    /// Cross-fade while scaling, with a slow drift between transitions.
    Zoom,
    /// Hard cut.
    None,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 4] = [
        TransitionKind::Fade,
        TransitionKind::Slide,
        TransitionKind::Zoom,
        TransitionKind::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Slide => "slide",
            Self::Zoom => "zoom",
            Self::None => "none",
        }
    }

    /// Whether this kind blends frames at photo boundaries.
    pub fn has_window(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fade" => Ok(Self::Fade),
            "slide" => Ok(Self::Slide),
            "zoom" => Ok(Self::Zoom),
            "none" | "cut" => Ok(Self::None),
            _ => Err(SettingsError::UnknownTransition {
                name: s.to_string(),
            }),
        }
    }
}

/// Settings for one export run. Immutable once the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// How long each photo stays on screen, transition included.
    pub seconds_per_photo: f64,

    /// Transition between consecutive photos.
    pub transition: TransitionKind,
}

impl ExportSettings {
    /// Output frame rate.
    pub const FRAME_RATE: u32 = 30;

    /// Output width in pixels.
    pub const OUTPUT_WIDTH: u32 = 1920;

    /// Output height in pixels.
    pub const OUTPUT_HEIGHT: u32 = 1080;

    pub const MIN_SECONDS_PER_PHOTO: f64 = 1.0;
    pub const MAX_SECONDS_PER_PHOTO: f64 = 5.0;
    pub const SECONDS_STEP: f64 = 0.5;

    pub fn new(seconds_per_photo: f64, transition: TransitionKind) -> Self {
        Self {
            seconds_per_photo,
            transition,
        }
    }

    /// Check range and step of `seconds_per_photo`.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let value = self.seconds_per_photo;
        if !value.is_finite()
            || !(Self::MIN_SECONDS_PER_PHOTO..=Self::MAX_SECONDS_PER_PHOTO).contains(&value)
        {
            return Err(SettingsError::SecondsOutOfRange {
                value,
                min: Self::MIN_SECONDS_PER_PHOTO,
                max: Self::MAX_SECONDS_PER_PHOTO,
            });
        }

        let steps = value / Self::SECONDS_STEP;
        if (steps - steps.round()).abs() > 1e-9 {
            return Err(SettingsError::SecondsOffStep {
                value,
                step: Self::SECONDS_STEP,
            });
        }

        Ok(())
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::new(3.0, TransitionKind::Fade)
    }
}
