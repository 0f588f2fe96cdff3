//! In-memory fakes for the engine's external seams.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use slidereel_common::error::{ReelError, ReelResult};

use crate::artifact::{ArtifactHandle, ArtifactStore, ExportArtifact};
use crate::encoder::{CodecCandidate, EncoderRuntime, FrameWriter, StreamSpec};
use crate::loader::ImageSource;

pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let mut bytes = Vec::new();
    solid(width, height, rgba)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Serves photos from memory, optionally after a delay.
#[derive(Default)]
pub struct MemorySource {
    entries: HashMap<String, (Vec<u8>, Duration)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, locator: &str, bytes: Vec<u8>) -> Self {
        self.with_delayed(locator, bytes, Duration::ZERO)
    }

    pub fn with_delayed(mut self, locator: &str, bytes: Vec<u8>, delay: Duration) -> Self {
        self.entries.insert(locator.to_string(), (bytes, delay));
        self
    }
}

#[async_trait]
impl ImageSource for MemorySource {
    async fn fetch(&self, locator: &str) -> ReelResult<Vec<u8>> {
        let (bytes, delay) = self
            .entries
            .get(locator)
            .cloned()
            .ok_or_else(|| ReelError::image_load(locator, "not found"))?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(bytes)
    }
}

/// Encoder runtime that accepts a fixed set of encoder names, counts the
/// frames written to it and keeps each frame's centre pixel.
#[derive(Default)]
pub struct FakeRuntime {
    supported: HashSet<&'static str>,
    fail_after: Option<u64>,
    write_delay: Duration,
    pub frames_written: Arc<AtomicU64>,
    pub opened: Arc<AtomicUsize>,
    pub centre_pixels: Arc<Mutex<Vec<[u8; 4]>>>,
}

impl FakeRuntime {
    pub fn supporting(encoders: &[&'static str]) -> Self {
        Self {
            supported: encoders.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// Block the writing thread for `delay` on every frame.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    pub fn centre_pixels(&self) -> Vec<[u8; 4]> {
        self.centre_pixels.lock().unwrap().clone()
    }
}

impl EncoderRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports(&self, candidate: &CodecCandidate) -> bool {
        self.supported.contains(candidate.encoder)
    }

    fn open(
        &self,
        candidate: &CodecCandidate,
        spec: &StreamSpec,
    ) -> ReelResult<Box<dyn FrameWriter>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWriter {
            tag: candidate.encoder,
            expected: (spec.width, spec.height),
            written: 0,
            total: self.frames_written.clone(),
            fail_after: self.fail_after,
            delay: self.write_delay,
            centres: self.centre_pixels.clone(),
        }))
    }
}

struct FakeWriter {
    tag: &'static str,
    expected: (u32, u32),
    written: u64,
    total: Arc<AtomicU64>,
    fail_after: Option<u64>,
    delay: Duration,
    centres: Arc<Mutex<Vec<[u8; 4]>>>,
}

impl FrameWriter for FakeWriter {
    fn write_frame(&mut self, frame: &RgbaImage) -> ReelResult<()> {
        if frame.dimensions() != self.expected {
            return Err(ReelError::encode_runtime("frame size mismatch"));
        }
        if self.fail_after.is_some_and(|limit| self.written >= limit) {
            return Err(ReelError::Io(std::io::Error::other("broken pipe")));
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let (w, h) = frame.dimensions();
        self.centres.lock().unwrap().push(frame.get_pixel(w / 2, h / 2).0);
        self.written += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(self: Box<Self>) -> ReelResult<Vec<u8>> {
        Ok(format!("{}:{}", self.tag, self.written).into_bytes())
    }
}

/// Artifact store that tracks how many handles are alive.
#[derive(Default)]
pub struct CountingStore {
    next_id: AtomicU64,
    pub live: AtomicUsize,
    pub published: AtomicUsize,
    pub revoked: Mutex<Vec<u64>>,
}

impl CountingStore {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

impl ArtifactStore for CountingStore {
    fn publish(&self, _artifact: &ExportArtifact) -> ReelResult<ArtifactHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(ArtifactHandle {
            id,
            preview_path: Some(PathBuf::from(format!("memory://{id}"))),
        })
    }

    fn revoke(&self, handle: ArtifactHandle) -> ReelResult<()> {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut revoked) = self.revoked.lock() {
            revoked.push(handle.id);
        }
        Ok(())
    }
}
