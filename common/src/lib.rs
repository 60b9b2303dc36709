//! Common types and utilities for deskwall.
//!
//! This crate defines the shared data structures and IPC protocol used for
//! communication between the daemon (`deskwall`) and
//! client (`dwctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using JSON-serialized
//! messages. The client sends [`Command`] variants and receives [`Response`]
//! variants, one per line.
//!
//! # Examples
//!
//! ```no_run
//! use common::{Command, WallpaperReference};
//!
//! let cmd = Command::SetWallpaper {
//!     reference: WallpaperReference::new("/wallpapers/tiles/brick.png"),
//! };
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default prefix marking a wallpaper reference as an opaque storage key.
pub const DEFAULT_STORAGE_PREFIX: &str = "indexeddb://";

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum DeskError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Video error: {0}")]
    Video(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for DeskError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for DeskError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Identifier for a desktop background: a local path, a remote URL, or an
/// opaque storage key.
///
/// References are never edited in place; a change replaces the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallpaperReference(String);

impl WallpaperReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this reference needs an asynchronous storage lookup.
    pub fn is_storage_key(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(prefix)
    }
}

impl fmt::Display for WallpaperReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WallpaperReference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for WallpaperReference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Resolved, directly renderable form of a [`WallpaperReference`].
///
/// Either the reference itself (paths and URLs) or inlined data pulled from
/// opaque storage. An empty source means no wallpaper.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplaySource(String);

impl DisplaySource {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&WallpaperReference> for DisplaySource {
    fn from(reference: &WallpaperReference) -> Self {
        Self(reference.as_str().to_string())
    }
}

impl fmt::Display for DisplaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// CSS-like background presentation derived from a [`DisplaySource`].
///
/// Unset fields are omitted when serialized, so an empty style renders as
/// `{}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_repeat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
}

impl PresentationStyle {
    pub fn is_empty(&self) -> bool {
        self.background_image.is_none()
            && self.background_size.is_none()
            && self.background_repeat.is_none()
            && self.background_position.is_none()
            && self.transition.is_none()
    }

    /// Layer `overrides` on top of this style. Any field set in `overrides`
    /// wins.
    pub fn merge(mut self, overrides: &PresentationStyle) -> Self {
        if overrides.background_image.is_some() {
            self.background_image = overrides.background_image.clone();
        }
        if overrides.background_size.is_some() {
            self.background_size = overrides.background_size.clone();
        }
        if overrides.background_repeat.is_some() {
            self.background_repeat = overrides.background_repeat.clone();
        }
        if overrides.background_position.is_some() {
            self.background_position = overrides.background_position.clone();
        }
        if overrides.transition.is_some() {
            self.transition = overrides.transition.clone();
        }
        self
    }
}

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Playback state of the video wallpaper surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Current wallpaper is not a video; the resumer is inactive
    #[default]
    NotVideo,
    Paused,
    Playing,
    Ended,
}

/// Buffered readiness of a media surface.
///
/// Numbered like the HTML media `readyState` attribute so that ordering
/// comparisons read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// One icon on the desktop grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconView {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub selected: bool,
}

/// Everything needed to draw the desktop
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesktopView {
    pub style: PresentationStyle,
    pub display_source: DisplaySource,
    /// Source handed to the native video surface, if the wallpaper is a video
    pub video_source: Option<String>,
    pub playback: PlaybackState,
    pub icons: Vec<IconView>,
}

/// Commands sent from client to daemon via IPC.
///
/// # Examples
///
/// ```
/// use common::{Command, WallpaperReference};
///
/// // Bring the desktop back into view, which resumes a paused video wallpaper
/// let cmd = Command::SetVisibility { visible: true };
///
/// // Publish a change without persisting it
/// let cmd = Command::NotifyWallpaper {
///     reference: WallpaperReference::new("https://cdn.example/loop.webm"),
/// };
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Persist a new current wallpaper and notify the desktop.
    SetWallpaper { reference: WallpaperReference },
    /// Publish a wallpaper-changed notification without persisting it.
    NotifyWallpaper { reference: WallpaperReference },
    /// Import a file into opaque storage. Responds with the new storage key.
    StoreWallpaper {
        /// Path to the file (must be absolute)
        path: String,
    },
    /// Report a page visibility change
    SetVisibility { visible: bool },
    /// Report that the desktop window gained focus
    Focus,
    /// Select an icon on the desktop grid
    SelectIcon { id: String },
    /// Open an icon (double click); clears the selection
    OpenIcon { id: String },
    /// Clear icon selection (background click)
    ClearSelection,
    /// Get the currently rendered desktop
    GetDesktop,
    /// Query daemon status
    Query,
    /// Kill the daemon
    Kill,
    /// Ping the daemon
    Ping,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Error(DeskError),
    Status(DaemonStatus),
    Desktop(DesktopView),
    Stored(WallpaperReference),
    Pong,
}

/// Daemon status information
#[derive(Debug, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub version: String,
    pub uptime_secs: u64,
    pub current_wallpaper: WallpaperReference,
    pub is_video_wallpaper: bool,
    pub playback: PlaybackState,
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("deskwall.sock")
}
