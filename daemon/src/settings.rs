//! Persisted wallpaper settings.
//!
//! Holds the user's current wallpaper choice across restarts and exposes it
//! as an observable value. Changing it also publishes a wallpaper-changed
//! notification on the bus.

use anyhow::{Context, Result};
use common::WallpaperReference;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

use crate::bus::{DesktopEvent, EventBus};
use crate::{resolver, storage};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSettings {
    #[serde(default)]
    current_wallpaper: WallpaperReference,
}

pub struct WallpaperSettings {
    path: Option<PathBuf>,
    current: watch::Sender<WallpaperReference>,
    bus: EventBus,
}

impl WallpaperSettings {
    /// Load settings from `path`, falling back to `fallback` when the file
    /// does not exist yet. `None` keeps everything in memory.
    pub fn load(
        path: Option<PathBuf>,
        fallback: WallpaperReference,
        bus: EventBus,
    ) -> Result<Self> {
        let current = match path.as_deref() {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read settings: {}", p.display()))?;
                let persisted: PersistedSettings = serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings: {}", p.display()))?;
                log::info!(
                    "Restored wallpaper {} from {}",
                    persisted.current_wallpaper,
                    p.display()
                );
                persisted.current_wallpaper
            }
            _ => fallback,
        };

        let (current, _) = watch::channel(current);
        Ok(Self { path, current, bus })
    }

    /// Get the default settings file path
    pub fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .context("Failed to get data directory")?
            .join("deskwall");

        Ok(data_dir.join("settings.json"))
    }

    /// Observe the current wallpaper
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<WallpaperReference> {
        self.current.subscribe()
    }

    pub fn current(&self) -> WallpaperReference {
        self.current.borrow().clone()
    }

    pub fn is_video_wallpaper(&self) -> bool {
        is_video_reference(&self.current.borrow())
    }

    /// Persist a new current wallpaper and announce it on the bus.
    ///
    /// Returns the bus sequence number of the notification.
    pub async fn set_current(&self, reference: WallpaperReference) -> Result<u64> {
        if let Some(ref path) = self.path {
            persist(path, &reference).await?;
        }

        self.current.send_replace(reference.clone());
        Ok(self.bus.publish(DesktopEvent::WallpaperChanged(reference)))
    }
}

/// Whether a reference names a video, judged by its text alone
pub fn is_video_reference(reference: &WallpaperReference) -> bool {
    let s = reference.as_str();
    !s.is_empty() && (resolver::is_video_source(s) || storage::guess_mime(s).starts_with("video/"))
}

async fn persist(path: &Path, reference: &WallpaperReference) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(&PersistedSettings {
        current_wallpaper: reference.clone(),
    })?;

    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write settings: {}", path.display()))?;

    log::debug!("Persisted wallpaper {} to {}", reference, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_reference_detection() {
        assert!(is_video_reference(&"/wallpapers/video/loop.mp4".into()));
        assert!(is_video_reference(&"indexeddb://custom-1-loop.webm".into()));
        assert!(!is_video_reference(&"/wallpapers/photos/aqua.jpg".into()));
        assert!(!is_video_reference(&"".into()));
    }

    #[tokio::test]
    async fn test_set_current_persists_and_publishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        let settings =
            WallpaperSettings::load(Some(path.clone()), "/a.png".into(), bus.clone()).unwrap();
        assert_eq!(settings.current(), WallpaperReference::new("/a.png"));

        let mut watcher = settings.subscribe();
        let seq = settings.set_current("/b.mp4".into()).await.unwrap();

        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), WallpaperReference::new("/b.mp4"));
        assert!(settings.is_video_wallpaper());

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.seq, seq);
        assert_eq!(
            envelope.event,
            DesktopEvent::WallpaperChanged(WallpaperReference::new("/b.mp4"))
        );

        // A fresh load sees the persisted value, not the fallback
        let reloaded = WallpaperSettings::load(Some(path), "/a.png".into(), bus).unwrap();
        assert_eq!(reloaded.current(), WallpaperReference::new("/b.mp4"));
    }

    #[test]
    fn test_in_memory_settings_use_fallback() {
        let settings =
            WallpaperSettings::load(None, "/wallpapers/tiles/brick.png".into(), EventBus::new())
                .unwrap();
        assert_eq!(
            settings.current(),
            WallpaperReference::new("/wallpapers/tiles/brick.png")
        );
        assert!(!settings.is_video_wallpaper());
    }
}
