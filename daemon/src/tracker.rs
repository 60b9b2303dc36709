//! Wallpaper state tracking.
//!
//! The tracker turns wallpaper references into the [`DisplaySource`] the
//! desktop draws. Paths and URLs resolve immediately; opaque storage keys are
//! looked up on a spawned task whose result comes back through
//! [`WallpaperTracker::complete`].
//!
//! Every resolution is tagged with a generation number. When a lookup
//! finishes after a newer reference was already issued, its result is
//! dropped, so the most recent notification always wins.

use common::{DisplaySource, WallpaperReference};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::storage::WallpaperStore;

/// Outcome of an asynchronous storage lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub generation: u64,
    pub reference: WallpaperReference,
    pub source: DisplaySource,
}

pub struct WallpaperTracker {
    store: Arc<dyn WallpaperStore>,
    storage_prefix: String,
    /// Generation of the most recently issued resolution
    generation: u64,
    /// Reference behind the most recently issued resolution
    reference: WallpaperReference,
    /// Reference behind the source currently shown
    shown: WallpaperReference,
    source: watch::Sender<DisplaySource>,
    initial_applied: bool,
    resolved_tx: mpsc::UnboundedSender<Resolution>,
}

impl WallpaperTracker {
    /// Create a tracker. Completed lookups are delivered on the returned
    /// receiver and must be fed back through [`Self::complete`].
    pub fn new(
        store: Arc<dyn WallpaperStore>,
        storage_prefix: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Resolution>) {
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();
        let (source, _) = watch::channel(DisplaySource::default());

        let tracker = Self {
            store,
            storage_prefix: storage_prefix.into(),
            generation: 0,
            reference: WallpaperReference::default(),
            shown: WallpaperReference::default(),
            source,
            initial_applied: false,
            resolved_tx,
        };
        (tracker, resolved_rx)
    }

    pub fn display_source(&self) -> DisplaySource {
        self.source.borrow().clone()
    }

    /// Reference whose resolution is currently shown
    pub fn shown_reference(&self) -> &WallpaperReference {
        &self.shown
    }

    /// Handle a wallpaper-changed notification.
    ///
    /// Returns `true` when the display source was updated synchronously,
    /// `false` when a storage lookup was started.
    pub fn notify(&mut self, seq: u64, reference: WallpaperReference) -> bool {
        log::debug!("Wallpaper notification #{}: {}", seq, reference);
        self.resolve(reference)
    }

    /// Apply the externally supplied initial reference.
    ///
    /// Only the first call can have an effect, and only if `reference` is
    /// non-empty and differs from the persisted `current` wallpaper.
    pub fn apply_initial(
        &mut self,
        reference: WallpaperReference,
        current: &WallpaperReference,
    ) -> bool {
        if self.initial_applied {
            return false;
        }
        self.initial_applied = true;

        if reference.is_empty() || &reference == current {
            return false;
        }

        log::info!("Applying initial wallpaper: {}", reference);
        self.resolve(reference);
        true
    }

    /// Follow the persisted current wallpaper.
    ///
    /// A value equal to the latest issued reference is already being shown
    /// (or resolved) and is skipped.
    pub fn sync_current(&mut self, reference: WallpaperReference) {
        if reference == self.reference && self.generation > 0 {
            return;
        }
        log::debug!("Syncing to persisted wallpaper: {}", reference);
        self.resolve(reference);
    }

    /// Accept a finished storage lookup. Returns `true` if it was applied,
    /// `false` if a newer resolution superseded it.
    pub fn complete(&mut self, resolution: Resolution) -> bool {
        if resolution.generation != self.generation {
            log::debug!(
                "Discarding stale lookup for {} (generation {} < {})",
                resolution.reference,
                resolution.generation,
                self.generation
            );
            return false;
        }

        self.shown = resolution.reference;
        self.source.send_replace(resolution.source);
        true
    }

    fn resolve(&mut self, reference: WallpaperReference) -> bool {
        self.generation += 1;
        self.reference = reference.clone();

        if !reference.is_storage_key(&self.storage_prefix) {
            self.source.send_replace(DisplaySource::from(&reference));
            self.shown = reference;
            return true;
        }

        let generation = self.generation;
        let store = Arc::clone(&self.store);
        let tx = self.resolved_tx.clone();

        tokio::spawn(async move {
            let source = match store.get(&reference).await {
                Ok(Some(data)) => data,
                Ok(None) => {
                    log::debug!("Storage miss for {}, using it as a path", reference);
                    DisplaySource::from(&reference)
                }
                Err(e) => {
                    log::warn!("Storage lookup for {} failed: {}", reference, e);
                    DisplaySource::from(&reference)
                }
            };

            // Receiver gone means the runtime shut down
            let _ = tx.send(Resolution {
                generation,
                reference,
                source,
            });
        });

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, StorageError};
    use async_trait::async_trait;
    use common::DEFAULT_STORAGE_PREFIX;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    /// Store whose lookups block until the test releases them
    struct GatedStore {
        entries: HashMap<String, (Arc<Notify>, DisplaySource)>,
    }

    impl GatedStore {
        fn new(keys: &[(&str, &str)]) -> (Self, Vec<Arc<Notify>>) {
            let mut entries = HashMap::new();
            let mut gates = Vec::new();
            for (key, data) in keys {
                let gate = Arc::new(Notify::new());
                gates.push(Arc::clone(&gate));
                entries.insert(key.to_string(), (gate, DisplaySource::new(*data)));
            }
            (Self { entries }, gates)
        }
    }

    #[async_trait]
    impl WallpaperStore for GatedStore {
        async fn get(
            &self,
            key: &WallpaperReference,
        ) -> Result<Option<DisplaySource>, StorageError> {
            match self.entries.get(key.as_str()) {
                Some((gate, data)) => {
                    gate.notified().await;
                    Ok(Some(data.clone()))
                }
                None => Ok(None),
            }
        }

        async fn put(&self, _: &str, _: &[u8]) -> Result<WallpaperReference, StorageError> {
            Err(StorageError::InvalidKey("read-only".to_string()))
        }
    }

    /// Store that always fails
    struct BrokenStore;

    #[async_trait]
    impl WallpaperStore for BrokenStore {
        async fn get(&self, _: &WallpaperReference) -> Result<Option<DisplaySource>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk on fire")))
        }

        async fn put(&self, _: &str, _: &[u8]) -> Result<WallpaperReference, StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk on fire")))
        }
    }

    fn memory_tracker() -> (
        WallpaperTracker,
        mpsc::UnboundedReceiver<Resolution>,
        Arc<MemoryStore>,
    ) {
        let store = Arc::new(MemoryStore::new(DEFAULT_STORAGE_PREFIX));
        let (tracker, rx) = WallpaperTracker::new(store.clone(), DEFAULT_STORAGE_PREFIX);
        (tracker, rx, store)
    }

    #[tokio::test]
    async fn test_plain_reference_is_synchronous() {
        let (mut tracker, _rx, _) = memory_tracker();

        assert!(tracker.notify(1, "/wallpapers/tiles/brick.png".into()));
        assert_eq!(
            tracker.display_source(),
            DisplaySource::new("/wallpapers/tiles/brick.png")
        );
    }

    #[tokio::test]
    async fn test_storage_hit_uses_resolved_data() {
        let (mut tracker, mut rx, store) = memory_tracker();
        store
            .insert("indexeddb://beach", DisplaySource::new("data:image/png;base64,AA=="))
            .await;

        assert!(!tracker.notify(1, "indexeddb://beach".into()));
        let resolution = rx.recv().await.unwrap();
        assert!(tracker.complete(resolution));

        assert_eq!(
            tracker.display_source(),
            DisplaySource::new("data:image/png;base64,AA==")
        );
        assert_eq!(
            tracker.shown_reference(),
            &WallpaperReference::new("indexeddb://beach")
        );
    }

    #[tokio::test]
    async fn test_storage_miss_falls_back_to_reference() {
        let (mut tracker, mut rx, _) = memory_tracker();

        tracker.notify(1, "indexeddb://gone".into());
        let resolution = rx.recv().await.unwrap();
        assert!(tracker.complete(resolution));

        assert_eq!(tracker.display_source(), DisplaySource::new("indexeddb://gone"));
    }

    #[tokio::test]
    async fn test_storage_error_falls_back_to_reference() {
        let (mut tracker, mut rx) = WallpaperTracker::new(Arc::new(BrokenStore), "indexeddb://");

        tracker.notify(1, "indexeddb://x".into());
        let resolution = rx.recv().await.unwrap();
        tracker.complete(resolution);

        assert_eq!(tracker.display_source(), DisplaySource::new("indexeddb://x"));
    }

    #[tokio::test]
    async fn test_slow_lookup_does_not_override_newer_notification() {
        let (store, gates) = GatedStore::new(&[
            ("indexeddb://slow", "data:slow"),
            ("indexeddb://fast", "data:fast"),
        ]);
        let (mut tracker, mut rx) = WallpaperTracker::new(Arc::new(store), "indexeddb://");

        tracker.notify(1, "indexeddb://slow".into());
        tracker.notify(2, "indexeddb://fast".into());
        assert!(tracker.display_source().is_empty());

        gates[1].notify_one();
        let fast = rx.recv().await.unwrap();
        assert!(tracker.complete(fast));
        assert_eq!(tracker.display_source(), DisplaySource::new("data:fast"));

        gates[0].notify_one();
        let slow = rx.recv().await.unwrap();
        assert_eq!(slow.reference, WallpaperReference::new("indexeddb://slow"));
        assert!(!tracker.complete(slow));
        assert_eq!(tracker.display_source(), DisplaySource::new("data:fast"));
    }

    #[tokio::test]
    async fn test_pending_lookup_loses_to_later_plain_path() {
        let (store, gates) = GatedStore::new(&[("indexeddb://slow", "data:slow")]);
        let (mut tracker, mut rx) = WallpaperTracker::new(Arc::new(store), "indexeddb://");

        tracker.notify(1, "indexeddb://slow".into());
        tracker.notify(2, "/wallpapers/photos/aqua.jpg".into());

        gates[0].notify_one();
        let slow = rx.recv().await.unwrap();
        assert!(!tracker.complete(slow));
        assert_eq!(
            tracker.display_source(),
            DisplaySource::new("/wallpapers/photos/aqua.jpg")
        );
    }

    #[tokio::test]
    async fn test_initial_reference_applies_once_and_only_if_different() {
        let (mut tracker, _rx, _) = memory_tracker();
        let current = WallpaperReference::new("/a.png");

        // Same as persisted: ignored, and the one chance is used up
        assert!(!tracker.apply_initial("/a.png".into(), &current));
        assert!(!tracker.apply_initial("/b.png".into(), &current));
        assert!(tracker.display_source().is_empty());

        let (mut tracker, _rx, _) = memory_tracker();
        assert!(tracker.apply_initial("/b.png".into(), &current));
        assert_eq!(tracker.display_source(), DisplaySource::new("/b.png"));
        assert!(!tracker.apply_initial("/c.png".into(), &current));
    }

    #[tokio::test]
    async fn test_empty_initial_reference_is_ignored() {
        let (mut tracker, _rx, _) = memory_tracker();
        assert!(!tracker.apply_initial("".into(), &"/a.png".into()));
    }

    #[tokio::test]
    async fn test_sync_current_skips_reference_already_issued() {
        let (mut tracker, _rx, _) = memory_tracker();

        tracker.sync_current("/a.png".into());
        assert_eq!(tracker.display_source(), DisplaySource::new("/a.png"));

        tracker.notify(5, "/b.png".into());
        tracker.sync_current("/b.png".into());
        assert_eq!(tracker.display_source(), DisplaySource::new("/b.png"));
        assert_eq!(tracker.generation, 2);

        tracker.sync_current("/c.png".into());
        assert_eq!(tracker.display_source(), DisplaySource::new("/c.png"));
    }
}
