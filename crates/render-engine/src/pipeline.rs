//! Encode pipeline: samples the live surface on its own clock and streams
//! each sample into a [`FrameWriter`].
//!
//! The sampler runs as a separate tokio task. It does not know how many
//! frames the render loop will draw; it just captures whatever is visible at
//! each tick until told to stop, then takes one last sample so the final
//! frame is never lost.
//!
//! Ticks fall on fixed deadlines `start + k / fps`. The output stream is
//! stamped at a constant rate, so every tick must yield exactly one written
//! frame: when a slow write makes the sampler miss ticks, the next sample is
//! repeated to cover them and the video keeps the length of the render.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slidereel_common::clock::{frame_interval, Clock};
use slidereel_common::error::{ReelError, ReelResult};
use tokio::task::JoinHandle;

use crate::encoder::{negotiate, CodecCandidate, EncoderRuntime, FrameWriter, StreamSpec};
use crate::surface::SurfaceReader;

/// Runtime statistics from one encode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// Frames handed to the writer.
    pub frames_sampled: u64,
    /// Samples that repeated an already-written surface frame, including
    /// repeats written to cover missed ticks.
    pub frames_duplicated: u64,
    /// Surface frames that were replaced before the sampler saw them.
    pub frames_skipped: u64,
    /// Raw bytes written to the encoder.
    pub bytes_written: u64,
}

impl EncodeStats {
    /// Share of drawn frames that never reached the encoder, as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let unique = self.frames_sampled - self.frames_duplicated;
        let total = unique + self.frames_skipped;
        if total == 0 {
            return 0.0;
        }
        self.frames_skipped as f64 / total as f64 * 100.0
    }

    /// Account for `copies` writes of surface frame `seq`.
    fn record(&mut self, seq: u64, last_seq: u64, copies: u64, bytes: usize) {
        if copies == 0 {
            return;
        }
        self.frames_sampled += copies;
        self.bytes_written += bytes as u64 * copies;
        if seq == last_seq {
            self.frames_duplicated += copies;
        } else {
            self.frames_duplicated += copies - 1;
            self.frames_skipped += seq.saturating_sub(last_seq + 1);
        }
    }
}

/// Finished output of an encode.
#[derive(Debug, Clone)]
pub struct EncodedStream {
    pub data: Vec<u8>,
    pub candidate: CodecCandidate,
    pub stats: EncodeStats,
}

/// Everything needed to start an encode.
#[derive(Clone)]
pub struct EncodePipeline {
    runtime: Arc<dyn EncoderRuntime>,
    clock: Arc<dyn Clock>,
    candidates: Vec<CodecCandidate>,
    frame_rate: u32,
    bitrate_kbps: u32,
}

impl EncodePipeline {
    pub fn new(
        runtime: Arc<dyn EncoderRuntime>,
        clock: Arc<dyn Clock>,
        candidates: Vec<CodecCandidate>,
        frame_rate: u32,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            runtime,
            clock,
            candidates,
            frame_rate,
            bitrate_kbps,
        }
    }

    /// Negotiate a codec, open a writer, and start sampling `reader`.
    pub fn open(&self, reader: SurfaceReader, width: u32, height: u32) -> ReelResult<EncodeHandle> {
        let candidate = negotiate(self.runtime.as_ref(), &self.candidates)?;
        let spec = StreamSpec {
            width,
            height,
            frame_rate: self.frame_rate,
            bitrate_kbps: self.bitrate_kbps,
        };
        let writer = self.runtime.open(&candidate, &spec).map_err(|e| match e {
            e @ ReelError::EncoderInitFailed { .. } => e,
            other => ReelError::encoder_init(other.to_string()),
        })?;

        tracing::info!(
            runtime = self.runtime.name(),
            mime_type = candidate.mime_type,
            width,
            height,
            fps = self.frame_rate,
            bitrate_kbps = self.bitrate_kbps,
            "Encoder opened"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_sampler(
            reader,
            writer,
            self.clock.clone(),
            self.frame_rate,
            stop.clone(),
        ));

        Ok(EncodeHandle {
            task: Some(task),
            stop,
            candidate,
        })
    }
}

type SamplerOutput = ReelResult<(Box<dyn FrameWriter>, EncodeStats)>;

/// A running encode. Dropping it aborts the sampler and discards the output.
pub struct EncodeHandle {
    task: Option<JoinHandle<SamplerOutput>>,
    stop: Arc<AtomicBool>,
    candidate: CodecCandidate,
}

impl EncodeHandle {
    pub fn candidate(&self) -> &CodecCandidate {
        &self.candidate
    }

    /// Whether the sampler has already stopped on its own.
    ///
    /// The sampler only ends early when a write fails, so a finished task
    /// before [`close`](Self::close) means the encode is broken.
    pub fn is_faulted(&self) -> bool {
        self.task.as_ref().is_some_and(|task| task.is_finished())
    }

    /// Stop sampling, finalize the writer, and return the encoded bytes.
    pub async fn close(mut self) -> ReelResult<EncodedStream> {
        self.stop.store(true, Ordering::SeqCst);
        let task = self
            .task
            .take()
            .ok_or_else(|| ReelError::encode_runtime("encoder already closed"))?;

        let (writer, stats) = task
            .await
            .map_err(|e| ReelError::encode_runtime(format!("sampler task failed: {e}")))??;

        let data = tokio::task::spawn_blocking(move || writer.finish())
            .await
            .map_err(|e| ReelError::encode_runtime(format!("encoder finalize task failed: {e}")))??;

        if stats.frames_skipped > 0 || stats.frames_duplicated > 0 {
            tracing::warn!(
                duplicated = stats.frames_duplicated,
                skipped = stats.frames_skipped,
                "Render loop and encoder drifted apart"
            );
        }
        tracing::info!(
            sampled = stats.frames_sampled,
            duplicated = stats.frames_duplicated,
            skipped = stats.frames_skipped,
            drop_rate = stats.drop_rate(),
            bytes = data.len(),
            "Encode finished"
        );

        Ok(EncodedStream {
            data,
            candidate: self.candidate,
            stats,
        })
    }
}

impl Drop for EncodeHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.stop.store(true, Ordering::SeqCst);
            task.abort();
        }
    }
}

async fn run_sampler(
    reader: SurfaceReader,
    mut writer: Box<dyn FrameWriter>,
    clock: Arc<dyn Clock>,
    fps: u32,
    stop: Arc<AtomicBool>,
) -> SamplerOutput {
    let interval = frame_interval(fps);
    let start = clock.now();
    let mut stats = EncodeStats::default();
    let mut last_seq = 0u64;
    // Ticks already accounted for, written or (before the first frame) passed over.
    let mut ticks = 0u64;

    loop {
        let stopping = stop.load(Ordering::SeqCst) || reader.is_closed();
        let frame = reader.current();
        let due = ticks_due(clock.now().saturating_duration_since(start), interval);
        let pending = due.saturating_sub(ticks);

        if frame.seq == 0 {
            // Nothing drawn yet; the blank surface is never encoded.
            ticks = ticks.max(due);
        } else {
            let fresh = frame.seq != last_seq;
            let copies = if stopping && fresh {
                pending.max(1)
            } else {
                pending
            };
            if copies > 0 {
                let bytes = frame.image.as_raw().len();
                let seq = frame.seq;
                let (returned, result) = tokio::task::spawn_blocking(move || {
                    let mut result = Ok(());
                    for _ in 0..copies {
                        result = writer.write_frame(&frame.image);
                        if result.is_err() {
                            break;
                        }
                    }
                    (writer, result)
                })
                .await
                .map_err(|e| ReelError::encode_runtime(format!("frame write task failed: {e}")))?;
                writer = returned;

                if let Err(err) = result {
                    tracing::error!(
                        error = %err,
                        sampled = stats.frames_sampled,
                        "Encoder rejected frame"
                    );
                    return Err(err.into_runtime());
                }
                if copies > 1 {
                    tracing::trace!(seq, copies, "Sampler caught up on missed ticks");
                }
                stats.record(seq, last_seq, copies, bytes);
                last_seq = seq;
                ticks += copies;
            }
        }

        if stopping {
            break;
        }
        clock.sleep_until(start + interval * ticks_u32(ticks)).await;
    }

    Ok((writer, stats))
}

/// Number of ticks whose deadline has been reached after `elapsed`; tick 0
/// falls at the start.
fn ticks_due(elapsed: Duration, interval: Duration) -> u64 {
    let interval = interval.as_nanos().max(1);
    (elapsed.as_nanos() / interval) as u64 + 1
}

fn ticks_u32(ticks: u64) -> u32 {
    u32::try_from(ticks).unwrap_or(u32::MAX)
}
