//! Slidereel Project Model
//!
//! Defines the data contracts consumed by the export engine:
//! - **Photos:** Ordered, read-only source locators supplied by the caller
//! - **Settings:** Seconds per photo and transition kind for one run
//! - **Timeline:** The pure mapping from an absolute frame index to the
//!   photo(s) on screen and the transition progress between them
//!
//! Frame rate and output size are fixed; they are exposed as constants on
//! [`ExportSettings`].

pub mod photo;
pub mod settings;
pub mod timeline;

pub use photo::*;
pub use settings::*;
pub use timeline::*;
