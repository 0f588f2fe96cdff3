//! Live drawing surface shared between the render loop and the sampler.
//!
//! The render loop publishes each finished frame; the sampler reads whatever
//! is current whenever its own clock ticks. Nothing synchronizes the two
//! beyond "last published frame wins", mirroring a canvas captured as a live
//! stream.

use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::watch;

/// One published frame.
#[derive(Debug)]
pub struct SurfaceFrame {
    /// Publish sequence number, starting at 1. Zero is the blank surface.
    pub seq: u64,
    pub image: RgbaImage,
}

/// Write side of the surface, owned by the render loop.
#[derive(Debug)]
pub struct LiveSurface {
    tx: watch::Sender<Arc<SurfaceFrame>>,
    width: u32,
    height: u32,
    published: u64,
}

impl LiveSurface {
    /// Create a surface that starts out opaque black.
    pub fn new(width: u32, height: u32) -> Self {
        let blank = RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
        let (tx, _rx) = watch::channel(Arc::new(SurfaceFrame {
            seq: 0,
            image: blank,
        }));
        Self {
            tx,
            width,
            height,
            published: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Replace the visible frame.
    ///
    /// Publishing never blocks and succeeds even with no readers attached.
    pub fn publish(&mut self, image: RgbaImage) {
        self.published += 1;
        self.tx.send_replace(Arc::new(SurfaceFrame {
            seq: self.published,
            image,
        }));
    }

    /// Attach a reader.
    pub fn reader(&self) -> SurfaceReader {
        SurfaceReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the surface, used by the sampler.
#[derive(Debug, Clone)]
pub struct SurfaceReader {
    rx: watch::Receiver<Arc<SurfaceFrame>>,
}

impl SurfaceReader {
    /// The frame visible right now.
    pub fn current(&self) -> Arc<SurfaceFrame> {
        self.rx.borrow().clone()
    }

    /// Whether the render loop has dropped its end of the surface.
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solid;

    #[test]
    fn test_starts_black() {
        let surface = LiveSurface::new(4, 2);
        let frame = surface.reader().current();
        assert_eq!(frame.seq, 0);
        assert!(frame.image.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_reader_sees_latest_publish() {
        let mut surface = LiveSurface::new(2, 2);
        let reader = surface.reader();
        surface.publish(solid(2, 2, [1, 1, 1, 255]));
        surface.publish(solid(2, 2, [2, 2, 2, 255]));
        let frame = reader.current();
        assert_eq!(frame.seq, 2);
        assert_eq!(frame.image.get_pixel(0, 0).0, [2, 2, 2, 255]);
        assert_eq!(surface.published(), 2);
    }

    #[test]
    fn test_publish_without_readers() {
        let mut surface = LiveSurface::new(1, 1);
        surface.publish(solid(1, 1, [9, 9, 9, 255]));
        assert_eq!(surface.reader().current().seq, 1);
    }

    #[test]
    fn test_reader_notices_close() {
        let surface = LiveSurface::new(1, 1);
        let reader = surface.reader();
        assert!(!reader.is_closed());
        drop(surface);
        assert!(reader.is_closed());
    }
}
