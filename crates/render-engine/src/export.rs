//! Export controller: runs one slideshow export at a time.
//!
//! ```text
//! Idle ──► Loading ──► Rendering ──► Finalizing ──► Ready
//!   ▲         │            │              │           │
//!   │         └────────────┴──► Failed ◄──┘           │
//!   └──────────────────────────────┘ ◄─── discard ────┘
//! ```
//!
//! A failed run reports its error and drops straight back to `Idle`, releasing
//! whatever it had acquired. A new run always releases the previous artifact
//! before doing anything else.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use slidereel_common::clock::{Clock, FramePacer, TokioClock};
use slidereel_common::config::AppConfig;
use slidereel_common::error::{ReelError, ReelResult};
use slidereel_project_model::{ExportSettings, SourcePhoto, Timeline};

use crate::artifact::{ArtifactSlot, ArtifactStore, ExportArtifact, PreviewDirStore};
use crate::compositor::{FrameCompositor, FrameMotion};
use crate::encoder::{
    CodecCandidate, EncoderRuntime, FfmpegRuntime, DEFAULT_BITRATE_KBPS, DEFAULT_CANDIDATES,
};
use crate::geometry::Canvas;
use crate::loader::{FsImageSource, ImageLoader, ImageSource, Raster};
use crate::pipeline::{EncodePipeline, EncodeStats};
use crate::progress::{ExportProgress, ExportStage, ProgressCallback, ProgressTracker};
use crate::surface::LiveSurface;

/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Loading,
    Rendering,
    Finalizing,
    /// An artifact is held and can be saved or discarded.
    Ready,
    /// Only observed through logs; the controller moves on to `Idle` as soon
    /// as the failure is recorded.
    Failed,
}

impl ExportState {
    /// Whether a run is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Loading | Self::Rendering | Self::Finalizing)
    }
}

/// Requests cooperative cancellation of the current run.
///
/// The render loop checks the flag before every frame and between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn check(&self) -> ReelResult<()> {
        if self.is_cancelled() {
            Err(ReelError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// External collaborators of the controller.
#[derive(Clone)]
pub struct ExportServices {
    pub source: Arc<dyn ImageSource>,
    pub runtime: Arc<dyn EncoderRuntime>,
    pub store: Arc<dyn ArtifactStore>,
    pub clock: Arc<dyn Clock>,
}

impl ExportServices {
    /// Filesystem photos, ffmpeg encoding, previews in the configured
    /// directory, and the tokio clock.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            source: Arc::new(FsImageSource::new()),
            runtime: Arc::new(FfmpegRuntime::from_config(&config.encoder)),
            store: Arc::new(PreviewDirStore::new(&config.preview_dir)),
            clock: Arc::new(TokioClock),
        }
    }
}

/// Tunables that are not part of the per-run settings.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Codecs to try, most preferred first.
    pub candidates: Vec<CodecCandidate>,
    pub bitrate_kbps: u32,
    pub max_parallel_loads: usize,
    canvas: Canvas,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.to_vec(),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            max_parallel_loads: 4,
            canvas: Canvas::default(),
        }
    }
}

impl ExportOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bitrate_kbps: config.encoder.video_bitrate_kbps.max(1),
            max_parallel_loads: config.loader.max_parallel_loads.max(1),
            ..Self::default()
        }
    }

    /// Output size.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    #[cfg(test)]
    pub(crate) fn with_canvas(mut self, canvas: Canvas) -> Self {
        self.canvas = canvas;
        self
    }
}

/// Summary of the last successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub photos_requested: usize,
    pub photos_loaded: usize,
    pub timeline: Timeline,
    /// Frame-pacing waits performed by the render loop.
    pub paced_frames: u64,
    pub mime_type: String,
    pub codec: String,
    pub bytes: usize,
    pub encode: EncodeStats,
}

/// Drives export runs and owns the resulting artifact.
pub struct ExportController {
    services: ExportServices,
    options: ExportOptions,
    state: ExportState,
    progress: ExportProgress,
    slot: ArtifactSlot,
    cancel: CancelHandle,
    last_error: Option<String>,
    last_report: Option<RunReport>,
}

impl ExportController {
    pub fn new(services: ExportServices, options: ExportOptions) -> Self {
        let slot = ArtifactSlot::new(services.store.clone());
        Self {
            services,
            options,
            state: ExportState::Idle,
            progress: ExportProgress::IDLE,
            slot,
            cancel: CancelHandle::default(),
            last_error: None,
            last_report: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ExportServices::from_config(config),
            ExportOptions::from_config(config),
        )
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Progress as of the end of the last run (or `{Idle, 0}`).
    ///
    /// Live updates go through the callback passed to [`export`](Self::export).
    pub fn progress(&self) -> ExportProgress {
        self.progress
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        self.slot.artifact()
    }

    /// Playable location of the held artifact, if the store provides one.
    pub fn preview_path(&self) -> Option<&Path> {
        self.slot.handle().and_then(|h| h.preview_path.as_deref())
    }

    /// Message of the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    /// Handle that can cancel the run in progress from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Export `photos` as a slideshow.
    ///
    /// Empty input and invalid settings are rejected before any state is
    /// touched: no partial state is created, so a controller that was
    /// `Ready` stays `Ready` with its artifact. Every other failure leaves
    /// the controller `Idle` with nothing held.
    ///
    /// Dropping the returned future cancels the run and releases everything
    /// it acquired.
    pub async fn export(
        &mut self,
        photos: &[SourcePhoto],
        settings: ExportSettings,
        on_progress: Option<ProgressCallback>,
    ) -> ReelResult<&ExportArtifact> {
        if photos.is_empty() {
            tracing::warn!("Export requested without photos");
            self.last_error = Some(ReelError::NoPhotos.to_string());
            return Err(ReelError::NoPhotos);
        }
        if let Err(err) = settings.validate() {
            let err = ReelError::invalid_settings(err.to_string());
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        self.slot.release();
        self.last_error = None;
        self.last_report = None;
        self.progress = ExportProgress::IDLE;
        self.cancel.clear();

        let mut tracker = ProgressTracker::new(on_progress);
        tracker.reset();

        tracing::info!(
            photos = photos.len(),
            seconds_per_photo = settings.seconds_per_photo,
            transition = %settings.transition,
            "Starting export"
        );

        let outcome = {
            let mut run = RunState::new(&mut self.state);
            run_export(
                &self.services,
                &self.options,
                &self.cancel,
                &mut tracker,
                &mut run,
                photos,
                settings,
            )
            .await
        };

        let published = match outcome {
            Ok((artifact, report)) => self
                .slot
                .acquire(artifact)
                .map(|_| report)
                .map_err(ReelError::into_runtime),
            Err(err) => Err(err.into_runtime()),
        };

        match published {
            Ok(report) => {
                tracker.finalizing(1.0);
                self.progress = tracker.current();
                self.state = ExportState::Ready;
                tracing::info!(
                    frames = report.timeline.total_frames(),
                    codec = %report.codec,
                    bytes = report.bytes,
                    "Export ready"
                );
                self.last_report = Some(report);
                self.slot
                    .artifact()
                    .ok_or_else(|| ReelError::encode_runtime("artifact vanished after publish"))
            }
            Err(err) => {
                self.state = ExportState::Failed;
                match &err {
                    ReelError::Cancelled => tracing::info!("Export cancelled"),
                    other => tracing::error!(error = %other, "Export failed"),
                }
                self.last_error = Some(err.to_string());
                self.slot.release();
                tracker.reset();
                self.progress = tracker.current();
                self.state = ExportState::Idle;
                Err(err)
            }
        }
    }

    /// Drop the held artifact and return to `Idle`.
    pub fn discard(&mut self) {
        if self.slot.release() {
            tracing::info!("Artifact discarded");
        }
        self.state = ExportState::Idle;
        self.progress = ExportProgress::IDLE;
    }

    /// Write the held artifact into `dir` as
    /// `<topic>-slideshow-<YYYY-MM-DD>.<ext>`.
    pub fn save_artifact(&self, dir: &Path, topic: &str) -> ReelResult<PathBuf> {
        self.slot
            .save(dir, topic, self.services.clock.today())?
            .ok_or_else(|| ReelError::Other(anyhow::anyhow!("no artifact to save")))
    }
}

impl std::fmt::Debug for ExportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportController")
            .field("state", &self.state)
            .field("progress", &self.progress)
            .field("slot", &self.slot)
            .finish()
    }
}

/// Tracks the controller state during a run and puts it back to `Idle` if
/// the run is abandoned midway.
struct RunState<'a> {
    state: &'a mut ExportState,
}

impl<'a> RunState<'a> {
    fn new(state: &'a mut ExportState) -> Self {
        Self { state }
    }

    fn enter(&mut self, next: ExportState) {
        tracing::debug!(from = ?*self.state, to = ?next, "Export state");
        *self.state = next;
    }
}

impl Drop for RunState<'_> {
    fn drop(&mut self) {
        if self.state.is_active() {
            *self.state = ExportState::Idle;
        }
    }
}

async fn run_export(
    services: &ExportServices,
    options: &ExportOptions,
    cancel: &CancelHandle,
    tracker: &mut ProgressTracker,
    run: &mut RunState<'_>,
    photos: &[SourcePhoto],
    settings: ExportSettings,
) -> ReelResult<(ExportArtifact, RunReport)> {
    // Loading
    run.enter(ExportState::Loading);
    tracker.loading(0, photos.len());
    let loader = ImageLoader::new(services.source.clone(), options.max_parallel_loads);
    let rasters = loader
        .load_all(photos, |done, total| tracker.loading(done, total))
        .await?;
    cancel.check()?;

    // Rendering
    run.enter(ExportState::Rendering);
    let timeline = Timeline::new(&settings, rasters.len());
    let total_frames = timeline.total_frames();
    tracker.rendering(0, total_frames);
    tracing::info!(
        photos = rasters.len(),
        total_frames,
        frames_per_photo = timeline.frames_per_photo(),
        transition_frames = timeline.transition_frames(),
        "Rendering slideshow"
    );

    let canvas = options.canvas();
    let mut surface = LiveSurface::new(canvas.width, canvas.height);
    let pipeline = EncodePipeline::new(
        services.runtime.clone(),
        services.clock.clone(),
        options.candidates.clone(),
        timeline.frame_rate(),
        options.bitrate_kbps,
    );
    let encoder = pipeline.open(surface.reader(), canvas.width, canvas.height)?;

    let rasters: Arc<Vec<Raster>> = Arc::new(rasters);
    let compositor = FrameCompositor::new(canvas);
    let mut pacer = FramePacer::new(services.clock.clone(), timeline.frame_rate());

    for schedule in timeline.frames() {
        cancel.check()?;
        if encoder.is_faulted() {
            // The sampler only stops early on a write error; surface it.
            encoder.close().await?;
            return Err(ReelError::encode_runtime("encoder stopped unexpectedly"));
        }

        let rasters = rasters.clone();
        let kind = settings.transition;
        let motion = FrameMotion::from_schedule(&schedule);
        let frame = tokio::task::spawn_blocking(move || {
            compositor.render(
                &rasters[schedule.photo_index].image,
                &rasters[schedule.next_photo_index].image,
                kind,
                motion,
            )
        })
        .await
        .map_err(|e| ReelError::encode_runtime(format!("frame render task failed: {e}")))?;

        surface.publish(frame);
        tracker.rendering(schedule.frame_index + 1, total_frames);
        pacer.wait_next().await;
    }
    cancel.check()?;

    // Finalizing
    run.enter(ExportState::Finalizing);
    tracker.advance(ExportProgress::within(ExportStage::Finalizing, 0.0));
    let candidate = *encoder.candidate();
    let stream = encoder.close().await?;
    drop(surface);
    tracker.finalizing(0.5);

    let report = RunReport {
        photos_requested: photos.len(),
        photos_loaded: rasters.len(),
        timeline,
        paced_frames: pacer.ticks(),
        mime_type: candidate.mime_type.to_string(),
        codec: candidate.encoder.to_string(),
        bytes: stream.data.len(),
        encode: stream.stats,
    };
    let artifact = ExportArtifact {
        data: stream.data,
        mime_type: candidate.mime_type.to_string(),
        extension: candidate.extension().to_string(),
        codec: candidate.encoder.to_string(),
        frame_count: total_frames,
    };
    Ok((artifact, report))
}
