//! Desktop runtime loop.
//!
//! A single task owns the tracker, the desktop surface and the playback
//! resumer, so none of them need locking. It reacts to:
//! - events from the [`EventBus`](crate::bus::EventBus)
//! - finished storage lookups
//! - readiness signals from the video surface
//!
//! Persisted wallpaper changes arrive as bus events too, so every wallpaper
//! change is applied in publish order.
//!
//! After every change the composed [`DesktopView`] is republished.

use anyhow::Result;
use common::{DesktopView, PlaybackState, WallpaperReference};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use crate::bus::{DesktopEvent, Envelope};
use crate::desktop::DesktopSurface;
use crate::resolver;
use crate::resumer::{MediaEvent, PlayableSurface, PlaybackResumer};
use crate::settings::{self, WallpaperSettings};
use crate::tracker::{Resolution, WallpaperTracker};

pub type VideoResumer = PlaybackResumer<Box<dyn PlayableSurface>>;

pub struct DesktopRuntime {
    tracker: WallpaperTracker,
    resolved_rx: mpsc::UnboundedReceiver<Resolution>,
    desktop: DesktopSurface,
    settings: Arc<WallpaperSettings>,
    resumer: Option<VideoResumer>,
    media_rx: mpsc::UnboundedReceiver<MediaEvent>,
    /// Source currently loaded into the video surface
    loaded_video: Option<String>,
    view: watch::Sender<DesktopView>,
}

impl DesktopRuntime {
    pub fn new(
        tracker: WallpaperTracker,
        resolved_rx: mpsc::UnboundedReceiver<Resolution>,
        desktop: DesktopSurface,
        settings: Arc<WallpaperSettings>,
        resumer: Option<VideoResumer>,
        media_rx: mpsc::UnboundedReceiver<MediaEvent>,
    ) -> Self {
        let (view, _) = watch::channel(DesktopView::default());
        Self {
            tracker,
            resolved_rx,
            desktop,
            settings,
            resumer,
            media_rx,
            loaded_video: None,
            view,
        }
    }

    /// Observe the rendered desktop
    pub fn subscribe(&self) -> watch::Receiver<DesktopView> {
        self.view.subscribe()
    }

    /// Show the persisted wallpaper, then the externally supplied initial
    /// one if it differs.
    pub fn start(&mut self, initial: Option<WallpaperReference>) {
        let current = self.settings.current();
        self.tracker.sync_current(current.clone());

        if let Some(initial) = initial {
            self.tracker.apply_initial(initial, &current);
        }

        self.refresh();
    }

    pub fn handle_event(&mut self, envelope: Envelope) {
        match envelope.event {
            DesktopEvent::WallpaperChanged(reference) => {
                self.tracker.notify(envelope.seq, reference);
            }
            DesktopEvent::VisibilityChanged(visibility) => {
                if let Some(ref mut resumer) = self.resumer {
                    resumer.on_visibility(visibility);
                }
            }
            DesktopEvent::FocusGained => {
                if let Some(ref mut resumer) = self.resumer {
                    resumer.on_focus();
                }
            }
            DesktopEvent::IconSelected(id) => {
                if !self.desktop.select(&id) {
                    log::warn!("Unknown desktop icon: {}", id);
                }
            }
            DesktopEvent::IconOpened(id) => {
                if !self.desktop.open(&id) {
                    log::warn!("Unknown desktop icon: {}", id);
                }
            }
            DesktopEvent::BackgroundClicked => self.desktop.clear_selection(),
        }

        self.refresh();
    }

    pub fn handle_resolution(&mut self, resolution: Resolution) {
        if self.tracker.complete(resolution) {
            self.refresh();
        }
    }

    pub fn handle_media(&mut self, event: MediaEvent) {
        if let Some(ref mut resumer) = self.resumer {
            resumer.on_media_event(event);
        }
        self.refresh();
    }

    /// Recompute everything derived from the display source and republish
    fn refresh(&mut self) {
        let source = self.tracker.display_source();
        let video_hint = settings::is_video_reference(self.tracker.shown_reference());
        let is_video =
            !source.is_empty() && (video_hint || resolver::is_video_source(source.as_str()));

        let playback = match self.resumer {
            Some(ref mut resumer) => {
                resumer.set_video(is_video);

                if !is_video {
                    self.loaded_video = None;
                } else if self.loaded_video.as_deref() != Some(source.as_str()) {
                    resumer.load(source.as_str());
                    self.loaded_video = Some(source.as_str().to_string());
                }
                resumer.state()
            }
            None if is_video => PlaybackState::Paused,
            None => PlaybackState::NotVideo,
        };

        let view = self.desktop.render(&source, video_hint, playback);
        if *self.view.borrow() != view {
            log::debug!("Desktop view updated: {:?}", view.style);
            self.view.send_replace(view);
        }
    }

    /// Run until `shutdown` flips to `true` or the bus closes
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<Envelope>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(envelope) => self.handle_event(envelope),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Desktop runtime fell behind, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(resolution) = self.resolved_rx.recv() => self.handle_resolution(resolution),
                Some(event) = self.media_rx.recv() => self.handle_media(event),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(ref mut resumer) = self.resumer {
            resumer.teardown();
        }
        log::info!("Desktop runtime stopped");
        Ok(())
    }
}
