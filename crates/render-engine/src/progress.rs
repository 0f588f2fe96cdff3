//! Export progress reporting.
//!
//! Each run moves through three stages that share one 0–100 scale:
//! loading fills 0–30, rendering 30–90 and finalizing 90–100. Within a run the
//! reported percentage never goes backwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stages of an export run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStage {
    Idle,
    Loading,
    Rendering,
    Finalizing,
}

impl ExportStage {
    /// Percentage range covered by this stage.
    pub fn band(self) -> (f64, f64) {
        match self {
            Self::Idle => (0.0, 0.0),
            Self::Loading => (0.0, 30.0),
            Self::Rendering => (30.0, 90.0),
            Self::Finalizing => (90.0, 100.0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Rendering => "rendering",
            Self::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Export progress report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub stage: ExportStage,
    /// Overall completion, 0–100.
    pub percent: f64,
}

impl ExportProgress {
    pub const IDLE: ExportProgress = ExportProgress {
        stage: ExportStage::Idle,
        percent: 0.0,
    };

    /// Progress at `fraction` of the way through `stage`.
    pub fn within(stage: ExportStage, fraction: f64) -> Self {
        let (start, end) = stage.band();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            stage,
            percent: start + (end - start) * fraction,
        }
    }
}

impl Default for ExportProgress {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Keeps a run's progress monotonic and forwards changes to a callback.
pub struct ProgressTracker {
    current: ExportProgress,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            current: ExportProgress::IDLE,
            callback,
        }
    }

    pub fn current(&self) -> ExportProgress {
        self.current
    }

    /// Back to `{Idle, 0}`; the only way progress may decrease.
    pub fn reset(&mut self) {
        self.current = ExportProgress::IDLE;
        self.emit();
    }

    /// `done` of `total` photos have finished loading.
    pub fn loading(&mut self, done: usize, total: usize) {
        self.advance(ExportProgress::within(
            ExportStage::Loading,
            ratio(done as f64, total as f64),
        ));
    }

    /// `done` of `total` frames have been drawn.
    pub fn rendering(&mut self, done: u64, total: u64) {
        self.advance(ExportProgress::within(
            ExportStage::Rendering,
            ratio(done as f64, total as f64),
        ));
    }

    /// Finalizing has reached `fraction`.
    pub fn finalizing(&mut self, fraction: f64) {
        self.advance(ExportProgress::within(ExportStage::Finalizing, fraction));
    }

    /// Report an update; anything that would move backwards is ignored.
    pub fn advance(&mut self, next: ExportProgress) {
        if next.stage < self.current.stage {
            return;
        }
        let percent = next.percent.max(self.current.percent).min(100.0);
        if next.stage == self.current.stage && percent == self.current.percent {
            return;
        }
        self.current = ExportProgress {
            stage: next.stage,
            percent,
        };
        self.emit();
    }

    fn emit(&self) {
        if let Some(cb) = &self.callback {
            cb(self.current);
        }
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current", &self.current)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

fn ratio(done: f64, total: f64) -> f64 {
    if total <= 0.0 {
        1.0
    } else {
        done / total
    }
}
