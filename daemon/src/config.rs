use anyhow::{Context, Result};
use common::{DEFAULT_STORAGE_PREFIX, PresentationStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub wallpaper: WallpaperSettings,

    #[serde(default)]
    pub desktop: DesktopSettings,

    #[serde(default)]
    pub video: VideoSettings,
}

/// General daemon settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Wallpaper selection and storage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WallpaperSettings {
    /// Reference shown on startup unless a different one was persisted
    #[serde(default)]
    pub initial: Option<String>,

    /// Prefix that marks a reference as an opaque storage key
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,

    /// Directory holding imported wallpapers. Supports `~` and `$VARS`.
    #[serde(default)]
    pub storage_dir: Option<String>,
}

impl Default for WallpaperSettings {
    fn default() -> Self {
        Self {
            initial: None,
            storage_prefix: default_storage_prefix(),
            storage_dir: None,
        }
    }
}

fn default_storage_prefix() -> String {
    DEFAULT_STORAGE_PREFIX.to_string()
}

/// Desktop composition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DesktopSettings {
    /// Icon ids never shown on the desktop
    #[serde(default = "default_hidden")]
    pub hidden: Vec<String>,

    /// Style fields that win over the computed wallpaper presentation
    #[serde(default)]
    pub style: PresentationStyle,

    #[serde(default, rename = "icon")]
    pub icons: Vec<IconEntry>,
}

impl Default for DesktopSettings {
    fn default() -> Self {
        Self {
            hidden: default_hidden(),
            style: PresentationStyle::default(),
            icons: Vec::new(),
        }
    }
}

fn default_hidden() -> Vec<String> {
    vec!["finder".to_string(), "control-panels".to_string()]
}

/// Icon on the desktop grid
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IconEntry {
    pub id: String,
    pub name: String,
    pub icon: String,
}

/// Video wallpaper playback
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sink")]
    pub sink: String,

    #[serde(default = "default_true")]
    pub muted: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sink: default_sink(),
            muted: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_sink() -> String {
    "autovideosink".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("deskwall");

        Ok(config_dir.join("config.toml"))
    }

    /// Directory for imported wallpapers, with `~` and env vars expanded
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match self.wallpaper.storage_dir {
            Some(ref dir) => {
                let expanded = shellexpand::full(dir)
                    .with_context(|| format!("Failed to expand storage dir: {}", dir))?;
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => Ok(dirs::data_dir()
                .context("Failed to get data directory")?
                .join("deskwall")
                .join("wallpapers")),
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;

        if self.wallpaper.storage_prefix.is_empty() {
            anyhow::bail!("storage_prefix must not be empty");
        }

        let mut seen = std::collections::HashSet::new();
        for icon in &self.desktop.icons {
            if !seen.insert(icon.id.as_str()) {
                anyhow::bail!("Duplicate desktop icon id: {}", icon.id);
            }
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.wallpaper.storage_prefix, "indexeddb://");
        assert_eq!(config.desktop.hidden, vec!["finder", "control-panels"]);
        assert!(config.video.enabled);
        assert!(config.video.muted);
        assert_eq!(config.video.sink, "autovideosink");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.wallpaper.initial.is_none());
        assert!(config.desktop.style.is_empty());
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[general]
log_level = "debug"

[wallpaper]
initial = "/wallpapers/tiles/brick.png"
storage_prefix = "store://"
storage_dir = "/tmp/walls"

[desktop]
hidden = ["finder"]

[desktop.style]
backgroundPosition = "top"

[[desktop.icon]]
id = "terminal"
name = "Terminal"
icon = "/icons/terminal.png"

[[desktop.icon]]
id = "discord"
name = "Discord"
icon = "/icons/discord.png"

[video]
enabled = false
sink = "fakesink"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(
            config.wallpaper.initial.as_deref(),
            Some("/wallpapers/tiles/brick.png")
        );
        assert_eq!(config.wallpaper.storage_prefix, "store://");
        assert_eq!(config.storage_dir().unwrap(), PathBuf::from("/tmp/walls"));
        assert_eq!(config.desktop.hidden, vec!["finder"]);
        assert_eq!(
            config.desktop.style.background_position.as_deref(),
            Some("top")
        );
        assert_eq!(config.desktop.icons.len(), 2);
        assert_eq!(config.desktop.icons[1].id, "discord");
        assert!(!config.video.enabled);
        assert_eq!(config.video.sink, "fakesink");
        assert!(config.video.muted);
    }

    #[test]
    fn test_invalid_log_level() {
        let err = Config::parse("[general]\nlog_level = \"loud\"\n").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_empty_storage_prefix_rejected() {
        assert!(Config::parse("[wallpaper]\nstorage_prefix = \"\"\n").is_err());
    }

    #[test]
    fn test_duplicate_icon_rejected() {
        let toml = r#"
[[desktop.icon]]
id = "wallet"
name = "Wallet"
icon = "/icons/wallet.png"

[[desktop.icon]]
id = "wallet"
name = "Wallet again"
icon = "/icons/wallet.png"
"#;
        assert!(Config::parse(toml).is_err());
    }
}
