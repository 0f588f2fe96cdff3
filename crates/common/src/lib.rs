//! Slidereel Common Utilities
//!
//! Shared infrastructure for all Slidereel crates:
//! - Error types and result aliases
//! - Clock and pacing utilities for the real-time render loop
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
