//! Slidereel Render Engine
//!
//! Turns an ordered list of photos into an encoded slideshow video. Frames are
//! drawn in real time onto a live surface that a streaming encoder samples on
//! its own clock.
//!
//! # Pipeline Architecture
//!
//! ```text
//! photos ──► loader ──► rasters ──┐
//!                                 │
//! settings ──► timeline ──────────┼──► compositor ──► live surface
//!                                 │                        │
//!                      frame pacer (1/fps) ◄───────────────┤
//!                                                          ▼
//!                                            sampler ──► encoder (ffmpeg)
//!                                                          │
//!                                                          ▼
//!                                                  artifact (webm/mp4)
//! ```

pub mod artifact;
pub mod compositor;
pub mod encoder;
pub mod export;
pub mod geometry;
pub mod loader;
pub mod pipeline;
pub mod progress;
pub mod surface;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::*;
pub use export::*;
pub use progress::*;
