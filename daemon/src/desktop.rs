//! Desktop surface composition.
//!
//! Combines the resolved wallpaper, configured style overrides and the icon
//! grid into the [`DesktopView`] that gets drawn.

use common::{DesktopView, DisplaySource, IconView, PlaybackState, PresentationStyle};

use crate::config::{DesktopSettings, IconEntry};
use crate::resolver;

pub struct DesktopSurface {
    overrides: PresentationStyle,
    icons: Vec<IconEntry>,
    selected: Option<String>,
}

impl DesktopSurface {
    pub fn new(settings: &DesktopSettings) -> Self {
        let icons = settings
            .icons
            .iter()
            .filter(|icon| !settings.hidden.contains(&icon.id))
            .cloned()
            .collect();

        Self {
            overrides: settings.style.clone(),
            icons,
            selected: None,
        }
    }

    /// Select an icon. Returns `false` for unknown ids.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.has_icon(id) {
            return false;
        }
        self.selected = Some(id.to_string());
        true
    }

    /// Open an icon, which also drops the selection
    pub fn open(&mut self, id: &str) -> bool {
        if !self.has_icon(id) {
            return false;
        }
        log::info!("Opening {}", id);
        self.selected = None;
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    #[cfg(test)]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn has_icon(&self, id: &str) -> bool {
        self.icons.iter().any(|icon| icon.id == id)
    }

    /// Compose the view for `source`.
    ///
    /// `video_hint` lets the persisted settings flag a video even when the
    /// source text carries no video indicator (stored uploads, for example).
    pub fn render(
        &self,
        source: &DisplaySource,
        video_hint: bool,
        playback: PlaybackState,
    ) -> DesktopView {
        let is_video =
            !source.is_empty() && (video_hint || resolver::is_video_source(source.as_str()));

        let style = if is_video {
            PresentationStyle::default()
        } else {
            resolver::resolve_presentation(source)
        };

        DesktopView {
            style: style.merge(&self.overrides),
            display_source: source.clone(),
            video_source: is_video.then(|| source.as_str().to_string()),
            playback,
            icons: self
                .icons
                .iter()
                .map(|icon| IconView {
                    id: icon.id.clone(),
                    name: icon.name.clone(),
                    icon: icon.icon.clone(),
                    selected: self.selected.as_deref() == Some(icon.id.as_str()),
                })
                .collect(),
        }
    }
}
