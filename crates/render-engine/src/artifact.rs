//! Export artifacts and the resources that make them reachable.
//!
//! A finished export is an in-memory blob. To hand it to a player or a
//! download prompt it is published through an [`ArtifactStore`], which
//! returns an [`ArtifactHandle`] that must be revoked once the artifact is
//! superseded or discarded. [`ArtifactSlot`] holds at most one artifact and
//! guarantees that revocation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use slidereel_common::error::{ReelError, ReelResult};

/// An encoded slideshow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
    /// File extension without the dot.
    pub extension: String,
    /// Encoder that produced the stream.
    pub codec: String,
    /// Frames drawn by the render loop.
    pub frame_count: u64,
}

impl ExportArtifact {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Download name for this artifact.
    pub fn file_name(&self, topic: &str, date: NaiveDate) -> String {
        artifact_file_name(topic, date, &self.extension)
    }
}

/// `<topic>-slideshow-<YYYY-MM-DD>.<ext>`, with the topic slugified.
pub fn artifact_file_name(topic: &str, date: NaiveDate, extension: &str) -> String {
    format!(
        "{}-slideshow-{}.{}",
        slugify(topic),
        date.format("%Y-%m-%d"),
        extension
    )
}

/// Lowercase ASCII alphanumerics separated by single dashes.
///
/// Falls back to `project` when nothing usable is left.
pub fn slugify(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    let mut pending_dash = false;
    for ch in topic.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Proof that an artifact was published.
#[derive(Debug, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub id: u64,
    /// Where a player can open the artifact, if the store provides one.
    pub preview_path: Option<PathBuf>,
}

/// Makes artifacts reachable outside the engine.
pub trait ArtifactStore: Send + Sync {
    fn publish(&self, artifact: &ExportArtifact) -> ReelResult<ArtifactHandle>;

    /// Release everything `publish` acquired for `handle`.
    fn revoke(&self, handle: ArtifactHandle) -> ReelResult<()>;
}

/// Writes each published artifact to a preview file and deletes it on revoke.
#[derive(Debug)]
pub struct PreviewDirStore {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl PreviewDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for PreviewDirStore {
    fn publish(&self, artifact: &ExportArtifact) -> ReelResult<ArtifactHandle> {
        std::fs::create_dir_all(&self.dir)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!(
            "preview-{}-{id}.{}",
            std::process::id(),
            artifact.extension
        ));
        std::fs::write(&path, &artifact.data)?;
        tracing::debug!(id, path = %path.display(), bytes = artifact.size(), "Preview published");
        Ok(ArtifactHandle {
            id,
            preview_path: Some(path),
        })
    }

    fn revoke(&self, handle: ArtifactHandle) -> ReelResult<()> {
        if let Some(path) = handle.preview_path {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tracing::debug!(id = handle.id, path = %path.display(), "Preview revoked");
        }
        Ok(())
    }
}

/// Holds at most one published artifact.
pub struct ArtifactSlot {
    store: Arc<dyn ArtifactStore>,
    held: Option<(ExportArtifact, ArtifactHandle)>,
}

impl ArtifactSlot {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store, held: None }
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        self.held.as_ref().map(|(artifact, _)| artifact)
    }

    pub fn handle(&self) -> Option<&ArtifactHandle> {
        self.held.as_ref().map(|(_, handle)| handle)
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    /// Publish `artifact` into an empty slot.
    ///
    /// An occupied slot is left untouched and nothing is published.
    pub fn acquire(&mut self, artifact: ExportArtifact) -> ReelResult<&ExportArtifact> {
        if let Some((_, held)) = &self.held {
            return Err(ReelError::Other(anyhow::anyhow!(
                "artifact slot already holds handle {}",
                held.id
            )));
        }
        let handle = self.store.publish(&artifact)?;
        let (artifact, _) = self.held.insert((artifact, handle));
        Ok(artifact)
    }

    /// Release the held artifact, if any, then publish `artifact`.
    ///
    /// The old handle is revoked before the new one is published, so the
    /// store never sees two at once. If publishing fails the slot is empty.
    pub fn replace(&mut self, artifact: ExportArtifact) -> ReelResult<&ExportArtifact> {
        self.release();
        self.acquire(artifact)
    }

    /// Revoke and drop the held artifact. Returns whether anything was held.
    pub fn release(&mut self) -> bool {
        let Some((artifact, handle)) = self.held.take() else {
            return false;
        };
        let id = handle.id;
        if let Err(err) = self.store.revoke(handle) {
            tracing::warn!(id, error = %err, "Failed to revoke artifact handle");
        }
        tracing::debug!(id, bytes = artifact.size(), "Artifact released");
        true
    }

    /// Write the held artifact into `dir` under its download name.
    pub fn save(&self, dir: &Path, topic: &str, date: NaiveDate) -> ReelResult<Option<PathBuf>> {
        let Some(artifact) = self.artifact() else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(artifact.file_name(topic, date));
        std::fs::write(&path, &artifact.data)?;
        tracing::info!(path = %path.display(), bytes = artifact.size(), "Artifact saved");
        Ok(Some(path))
    }
}

impl Drop for ArtifactSlot {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ArtifactSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSlot")
            .field("handle", &self.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStore;

    fn artifact(bytes: &[u8]) -> ExportArtifact {
        ExportArtifact {
            data: bytes.to_vec(),
            mime_type: "video/webm;codecs=vp9".to_string(),
            extension: "webm".to_string(),
            codec: "libvpx-vp9".to_string(),
            frame_count: 90,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("slidereel-artifact-{name}-{}", std::process::id()))
    }

    #[test]
    fn test_file_name_convention() {
        assert_eq!(
            artifact(b"x").file_name("Summer Trip", date()),
            "summer-trip-slideshow-2024-06-03.webm"
        );
        assert_eq!(
            artifact_file_name("  Café & Friends!! ", date(), "mp4"),
            "caf-friends-slideshow-2024-06-03.mp4"
        );
        assert_eq!(artifact_file_name("???", date(), "mp4"), "project-slideshow-2024-06-03.mp4");
    }

    #[test]
    fn test_slot_releases_before_acquiring() {
        let store = Arc::new(CountingStore::default());
        let mut slot = ArtifactSlot::new(store.clone());
        for i in 0..5u8 {
            slot.replace(artifact(&[i])).unwrap();
            assert_eq!(store.live(), 1);
        }
        assert_eq!(store.published(), 5);
        assert_eq!(*store.revoked.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(slot.artifact().unwrap().data, vec![4]);
    }

    #[test]
    fn test_acquire_refuses_occupied_slot() {
        let store = Arc::new(CountingStore::default());
        let mut slot = ArtifactSlot::new(store.clone());
        slot.acquire(artifact(b"first")).unwrap();

        assert!(slot.acquire(artifact(b"second")).is_err());
        assert_eq!(store.published(), 1);
        assert_eq!(store.live(), 1);
        assert_eq!(slot.artifact().unwrap().data, b"first");
    }

    #[test]
    fn test_drop_releases() {
        let store = Arc::new(CountingStore::default());
        {
            let mut slot = ArtifactSlot::new(store.clone());
            slot.acquire(artifact(b"a")).unwrap();
            assert_eq!(store.live(), 1);
        }
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn test_release_on_empty_slot() {
        let store = Arc::new(CountingStore::default());
        let mut slot = ArtifactSlot::new(store.clone());
        assert!(!slot.release());
        slot.acquire(artifact(b"a")).unwrap();
        assert!(slot.release());
        assert!(slot.is_empty());
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn test_preview_store_writes_and_removes() {
        let dir = temp_dir("preview");
        let store = PreviewDirStore::new(&dir);
        let handle = store.publish(&artifact(b"video")).unwrap();
        let path = handle.preview_path.clone().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"video");

        store.revoke(handle).unwrap();
        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_save_writes_download_name() {
        let dir = temp_dir("save");
        let store = Arc::new(CountingStore::default());
        let mut slot = ArtifactSlot::new(store);
        assert_eq!(slot.save(&dir, "Trip", date()).unwrap(), None);

        slot.acquire(artifact(b"bytes")).unwrap();
        let path = slot.save(&dir, "Trip", date()).unwrap().unwrap();
        assert!(path.ends_with("trip-slideshow-2024-06-03.webm"));
        assert_eq!(std::fs::read(&path).unwrap(), b"bytes");
        std::fs::remove_dir_all(&dir).ok();
    }
}
