//! Error types shared across Slidereel crates.

/// Top-level error type for Slidereel operations.
///
/// The first five variants are the export taxonomy surfaced to callers. Every one
/// of them is terminal for the run that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("No photos were provided for export")]
    NoPhotos,

    #[error("None of the {attempted} photos could be loaded")]
    NoLoadableImages { attempted: usize },

    #[error("Encoder initialization failed: {message}")]
    EncoderInitFailed { message: String },

    #[error("Encoding failed: {message}")]
    EncodeRuntime { message: String },

    #[error("Export was cancelled")]
    Cancelled,

    #[error("Invalid export settings: {message}")]
    InvalidSettings { message: String },

    #[error("Failed to load image {locator}: {message}")]
    ImageLoad { locator: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn encoder_init(msg: impl Into<String>) -> Self {
        Self::EncoderInitFailed {
            message: msg.into(),
        }
    }

    pub fn encode_runtime(msg: impl Into<String>) -> Self {
        Self::EncodeRuntime {
            message: msg.into(),
        }
    }

    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: msg.into(),
        }
    }

    pub fn image_load(locator: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ImageLoad {
            locator: locator.into(),
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error belongs to the export taxonomy and may pass through the
    /// render loop unchanged.
    pub fn is_export_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoPhotos
                | Self::NoLoadableImages { .. }
                | Self::EncoderInitFailed { .. }
                | Self::EncodeRuntime { .. }
                | Self::Cancelled
        )
    }

    /// Collapse anything outside the export taxonomy into `EncodeRuntime`.
    pub fn into_runtime(self) -> Self {
        if self.is_export_terminal() {
            self
        } else {
            Self::encode_runtime(self.to_string())
        }
    }
}
