//! Image loading: fetch and decode every source photo into an RGBA raster.
//!
//! Loads may complete in any order, but the returned rasters always follow
//! the input order. A photo that cannot be fetched or decoded is logged and
//! skipped; only a batch with no survivors is an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use slidereel_common::error::{ReelError, ReelResult};
use slidereel_project_model::SourcePhoto;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Resolves a locator to encoded image bytes.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the raw (still encoded) bytes for `locator`.
    async fn fetch(&self, locator: &str) -> ReelResult<Vec<u8>>;
}

/// Reads photos from the local filesystem.
///
/// Locators may be plain paths or `file://` URLs. Relative paths resolve
/// against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FsImageSource {
    root: Option<PathBuf>,
}

impl FsImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let path = Path::new(locator.strip_prefix("file://").unwrap_or(locator));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn fetch(&self, locator: &str) -> ReelResult<Vec<u8>> {
        let path = self.resolve(locator);
        tokio::fs::read(&path)
            .await
            .map_err(|e| ReelError::image_load(locator, format!("{}: {e}", path.display())))
    }
}

/// Decode encoded image bytes into an RGBA raster.
pub fn decode(locator: &str, bytes: &[u8]) -> ReelResult<RgbaImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| ReelError::image_load(locator, e.to_string()))?
        .to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(ReelError::image_load(locator, "image has no pixels"));
    }
    Ok(image)
}

/// A decoded photo.
#[derive(Debug, Clone)]
pub struct Raster {
    /// Position of the photo in the caller's list.
    pub source_index: usize,
    /// Locator it was loaded from.
    pub locator: String,
    /// Decoded pixels.
    pub image: RgbaImage,
}

/// Loads a batch of photos through an [`ImageSource`].
#[derive(Clone)]
pub struct ImageLoader {
    source: Arc<dyn ImageSource>,
    max_parallel: usize,
}

impl ImageLoader {
    pub fn new(source: Arc<dyn ImageSource>, max_parallel: usize) -> Self {
        Self {
            source,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Fetch and decode a single photo.
    pub async fn load(&self, locator: &str) -> ReelResult<RgbaImage> {
        load_one(self.source.clone(), locator.to_string()).await
    }

    /// Load every photo, preserving input order in the result.
    ///
    /// `on_loaded(done, total)` is called after each load finishes, successful
    /// or not.
    pub async fn load_all<F>(
        &self,
        photos: &[SourcePhoto],
        mut on_loaded: F,
    ) -> ReelResult<Vec<Raster>>
    where
        F: FnMut(usize, usize),
    {
        if photos.is_empty() {
            return Err(ReelError::NoPhotos);
        }

        let total = photos.len();
        let permits = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = JoinSet::new();

        for (index, photo) in photos.iter().enumerate() {
            let source = self.source.clone();
            let permits = permits.clone();
            let locator = photo.locator.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = load_one(source, locator.clone()).await;
                (index, locator, result)
            });
        }

        let mut slots: Vec<Option<Raster>> = (0..total).map(|_| None).collect();
        let mut done = 0usize;
        while let Some(joined) = tasks.join_next().await {
            done += 1;
            match joined {
                Ok((index, locator, Ok(image))) => {
                    tracing::debug!(
                        index,
                        locator = %locator,
                        width = image.width(),
                        height = image.height(),
                        "Photo loaded"
                    );
                    slots[index] = Some(Raster {
                        source_index: index,
                        locator,
                        image,
                    });
                }
                Ok((index, locator, Err(err))) => {
                    tracing::warn!(
                        index,
                        locator = %locator,
                        error = %err,
                        "Skipping photo that failed to load"
                    );
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Photo load task did not complete");
                }
            }
            on_loaded(done, total);
        }

        let rasters: Vec<Raster> = slots.into_iter().flatten().collect();
        if rasters.is_empty() {
            return Err(ReelError::NoLoadableImages { attempted: total });
        }

        tracing::info!(
            requested = total,
            loaded = rasters.len(),
            skipped = total - rasters.len(),
            "Photos loaded"
        );
        Ok(rasters)
    }
}

async fn load_one(source: Arc<dyn ImageSource>, locator: String) -> ReelResult<RgbaImage> {
    let bytes = source.fetch(&locator).await?;
    tokio::task::spawn_blocking(move || decode(&locator, &bytes))
        .await
        .map_err(|e| ReelError::Other(anyhow::anyhow!("decode task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, MemorySource};
    use std::time::Duration;

    fn photos(locators: &[&str]) -> Vec<SourcePhoto> {
        locators.iter().map(|l| SourcePhoto::new(*l)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_preserved_when_completion_reversed() {
        let source = MemorySource::new()
            .with_delayed("a", png_bytes(4, 2, [255, 0, 0, 255]), Duration::from_millis(300))
            .with_delayed("b", png_bytes(6, 2, [0, 255, 0, 255]), Duration::from_millis(200))
            .with_delayed("c", png_bytes(8, 2, [0, 0, 255, 255]), Duration::from_millis(100));
        let loader = ImageLoader::new(Arc::new(source), 3);

        let mut calls = Vec::new();
        let rasters = loader
            .load_all(&photos(&["a", "b", "c"]), |done, total| calls.push((done, total)))
            .await
            .unwrap();

        let widths: Vec<u32> = rasters.iter().map(|r| r.image.width()).collect();
        assert_eq!(widths, vec![4, 6, 8]);
        let indices: Vec<usize> = rasters.iter().map(|r| r.source_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_failures_are_skipped() {
        let source = MemorySource::new()
            .with("good-1", png_bytes(2, 2, [1, 2, 3, 255]))
            .with("corrupt", b"not an image".to_vec())
            .with("good-2", png_bytes(3, 3, [4, 5, 6, 255]));
        let loader = ImageLoader::new(Arc::new(source), 2);

        let rasters = loader
            .load_all(&photos(&["good-1", "missing", "corrupt", "good-2"]), |_, _| {})
            .await
            .unwrap();

        let locators: Vec<&str> = rasters.iter().map(|r| r.locator.as_str()).collect();
        assert_eq!(locators, vec!["good-1", "good-2"]);
        assert_eq!(rasters[1].source_index, 3);
    }

    #[tokio::test]
    async fn test_all_failures_is_no_loadable_images() {
        let loader = ImageLoader::new(Arc::new(MemorySource::new()), 4);
        let err = loader
            .load_all(&photos(&["x", "y"]), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ReelError::NoLoadableImages { attempted: 2 }));
    }

    #[tokio::test]
    async fn test_empty_input_is_no_photos() {
        let loader = ImageLoader::new(Arc::new(MemorySource::new()), 4);
        let err = loader.load_all(&[], |_, _| {}).await.unwrap_err();
        assert!(matches!(err, ReelError::NoPhotos));
    }

    #[tokio::test]
    async fn test_fs_source_reads_file_urls() {
        let dir = std::env::temp_dir().join(format!("slidereel-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("photo.png");
        std::fs::write(&path, png_bytes(5, 4, [9, 9, 9, 255])).unwrap();

        let loader = ImageLoader::new(Arc::new(FsImageSource::with_root(&dir)), 1);
        let by_name = loader.load("photo.png").await.unwrap();
        let by_url = loader
            .load(&format!("file://{}", path.display()))
            .await
            .unwrap();
        assert_eq!(by_name.dimensions(), (5, 4));
        assert_eq!(by_url.dimensions(), (5, 4));

        std::fs::remove_dir_all(&dir).ok();
    }
}
