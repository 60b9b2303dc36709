//! Opaque wallpaper storage.
//!
//! Wallpapers imported by the user are kept behind opaque keys such as
//! `indexeddb://custom-1718000000-beach.jpg`. Looking one up yields inlined
//! data (a `data:` URL) that can be drawn directly.

use async_trait::async_trait;
use base64::Engine as _;
use common::{DisplaySource, WallpaperReference};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// Key/value store holding wallpaper data behind opaque keys
#[async_trait]
pub trait WallpaperStore: Send + Sync {
    /// Look up the data behind `key`. `Ok(None)` is a miss.
    async fn get(&self, key: &WallpaperReference) -> Result<Option<DisplaySource>, StorageError>;

    /// Store `data` under a fresh key derived from `name` and return the key.
    async fn put(&self, name: &str, data: &[u8]) -> Result<WallpaperReference, StorageError>;
}

/// Encode raw bytes as a `data:` URL
pub fn to_data_url(mime: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(data)
    )
}

/// Guess a MIME type from a file name's extension
pub fn guess_mime(path: impl AsRef<Path>) -> &'static str {
    let path = path.as_ref();

    if let Ok(format) = image::ImageFormat::from_path(path) {
        return format.to_mime_type();
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Turn an arbitrary file name into something safe to embed in a key
fn sanitize_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "wallpaper".to_string()
    } else {
        cleaned
    }
}

fn fresh_id(name: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("custom-{}-{}", millis, sanitize_name(name))
}

/// In-memory store, mostly useful for tests and ephemeral sessions
pub struct MemoryStore {
    prefix: String,
    entries: RwLock<HashMap<String, DisplaySource>>,
}

impl MemoryStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert data under an explicit key
    pub async fn insert(&self, key: impl Into<String>, data: DisplaySource) {
        self.entries.write().await.insert(key.into(), data);
    }
}

#[async_trait]
impl WallpaperStore for MemoryStore {
    async fn get(&self, key: &WallpaperReference) -> Result<Option<DisplaySource>, StorageError> {
        Ok(self.entries.read().await.get(key.as_str()).cloned())
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<WallpaperReference, StorageError> {
        let key = format!("{}{}", self.prefix, fresh_id(name));
        let source = DisplaySource::new(to_data_url(guess_mime(name), data));
        self.entries.write().await.insert(key.clone(), source);
        Ok(WallpaperReference::new(key))
    }
}

/// Store backed by one file per key inside a directory
pub struct DirectoryStore {
    prefix: String,
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(prefix: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            dir: dir.into(),
        }
    }

    /// Map a key to its backing file, refusing anything that could escape
    /// the storage directory.
    fn entry_path(&self, key: &WallpaperReference) -> Result<PathBuf, StorageError> {
        let id = key
            .as_str()
            .strip_prefix(&self.prefix)
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;

        if id.is_empty() || id.contains('/') || id.contains('\\') || id.starts_with('.') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.dir.join(id))
    }
}

#[async_trait]
impl WallpaperStore for DirectoryStore {
    async fn get(&self, key: &WallpaperReference) -> Result<Option<DisplaySource>, StorageError> {
        let path = self.entry_path(key)?;

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        log::debug!("Loaded {} bytes for {}", data.len(), key);
        Ok(Some(DisplaySource::new(to_data_url(guess_mime(&path), &data))))
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<WallpaperReference, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let id = fresh_id(name);
        tokio::fs::write(self.dir.join(&id), data).await?;

        log::info!("Stored wallpaper {} ({} bytes)", id, data.len());
        Ok(WallpaperReference::new(format!("{}{}", self.prefix, id)))
    }
}
