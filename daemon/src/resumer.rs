//! Video wallpaper playback resumption.
//!
//! Hosts tend to pause or stall a background video while the desktop is
//! hidden. [`PlaybackResumer`] restarts it whenever the desktop becomes
//! visible or focused, and whenever the surface reports it can play through.
//!
//! The resumer only talks to the video through [`PlayableSurface`], so the
//! state machine runs the same against GStreamer or a test double.

use common::{PlaybackState, ReadyState, Visibility};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[cfg_attr(not(feature = "video"), allow(dead_code))]
pub enum PlayError {
    /// The platform refused to start playback (autoplay policy and similar)
    #[error("Playback blocked: {0}")]
    Blocked(String),

    #[error("Playback failed: {0}")]
    Failed(String),
}

/// Minimal capabilities of a video element
pub trait PlayableSurface: Send {
    /// Point the surface at a new video source
    fn set_source(&mut self, source: &str) -> Result<(), PlayError>;

    fn play(&mut self) -> Result<(), PlayError>;

    fn pause(&mut self) -> Result<(), PlayError>;

    fn current_time(&self) -> Duration;

    fn seek(&mut self, position: Duration) -> Result<(), PlayError>;

    fn ready_state(&self) -> ReadyState;

    fn is_paused(&self) -> bool;

    fn has_ended(&self) -> bool;
}

impl<S: PlayableSurface + ?Sized> PlayableSurface for Box<S> {
    fn set_source(&mut self, source: &str) -> Result<(), PlayError> {
        (**self).set_source(source)
    }

    fn play(&mut self) -> Result<(), PlayError> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<(), PlayError> {
        (**self).pause()
    }

    fn current_time(&self) -> Duration {
        (**self).current_time()
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlayError> {
        (**self).seek(position)
    }

    fn ready_state(&self) -> ReadyState {
        (**self).ready_state()
    }

    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }

    fn has_ended(&self) -> bool {
        (**self).has_ended()
    }
}

/// Readiness signals emitted by a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// Enough data to start playing
    CanPlay,
    /// Enough data to play to the end without stalling
    CanPlayThrough,
    /// Reached the end of the stream
    Ended,
}

/// Listeners the resumer can have registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    Visibility,
    Focus,
    CanPlayThrough,
    /// Removed after its first invocation
    CanPlayOnce,
}

pub struct PlaybackResumer<S> {
    surface: S,
    active: bool,
    listeners: HashSet<Listener>,
}

impl<S: PlayableSurface> PlaybackResumer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            active: false,
            listeners: HashSet::new(),
        }
    }

    /// Switch between video and non-video wallpapers.
    ///
    /// Becoming active registers the visibility, focus and can-play-through
    /// listeners; becoming inactive removes every listener, pending one-shots
    /// included, and pauses the surface.
    pub fn set_video(&mut self, is_video: bool) {
        if is_video == self.active {
            return;
        }
        self.active = is_video;

        if is_video {
            self.listeners.insert(Listener::Visibility);
            self.listeners.insert(Listener::Focus);
            self.listeners.insert(Listener::CanPlayThrough);
            log::debug!("Video wallpaper active, playback listeners registered");
        } else {
            self.listeners.clear();
            if let Err(e) = self.surface.pause() {
                log::warn!("Could not pause video wallpaper: {}", e);
            }
            log::debug!("Video wallpaper inactive, playback listeners removed");
        }
    }

    /// Load a new video into the surface and try to start it
    pub fn load(&mut self, source: &str) {
        if let Err(e) = self.surface.set_source(source) {
            log::warn!("Could not load video wallpaper: {}", e);
            return;
        }
        self.resume();
    }

    /// Remove all listeners. Call on shutdown.
    pub fn teardown(&mut self) {
        self.set_video(false);
    }

    pub fn state(&self) -> PlaybackState {
        if !self.active {
            PlaybackState::NotVideo
        } else if self.surface.has_ended() {
            PlaybackState::Ended
        } else if self.surface.is_paused() {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    pub fn on_visibility(&mut self, visibility: Visibility) {
        if visibility == Visibility::Visible && self.is_listening(Listener::Visibility) {
            self.resume();
        }
    }

    pub fn on_focus(&mut self) {
        if self.is_listening(Listener::Focus) {
            self.resume();
        }
    }

    pub fn on_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::CanPlay => {
                if self.listeners.remove(&Listener::CanPlayOnce) {
                    self.try_play();
                }
            }
            MediaEvent::CanPlayThrough => {
                if self.is_listening(Listener::CanPlayThrough) && self.surface.is_paused() {
                    self.try_play();
                }
            }
            // Restarted by the next visibility or focus trigger
            MediaEvent::Ended => log::debug!("Video wallpaper ended"),
        }
    }

    pub fn is_listening(&self, listener: Listener) -> bool {
        self.listeners.contains(&listener)
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[cfg(test)]
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    fn resume(&mut self) {
        if !self.active {
            return;
        }

        if self.surface.has_ended() {
            if let Err(e) = self.surface.seek(Duration::ZERO) {
                log::warn!("Could not rewind video wallpaper: {}", e);
            }
        }

        if self.surface.ready_state() >= ReadyState::HaveFutureData {
            self.try_play();
        } else {
            log::debug!("Video not ready, waiting for it to become playable");
            self.listeners.insert(Listener::CanPlayOnce);
        }
    }

    fn try_play(&mut self) {
        match self.surface.play() {
            Ok(()) => log::debug!("Video playback resumed"),
            Err(e) => log::warn!("Could not resume video playback: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockSurface {
        ready: ReadyState,
        paused: bool,
        ended: bool,
        time: Duration,
        block_play: bool,
        ops: Vec<&'static str>,
    }

    impl MockSurface {
        fn ready() -> Self {
            Self {
                ready: ReadyState::HaveEnoughData,
                paused: true,
                ..Default::default()
            }
        }

        fn plays(&self) -> usize {
            self.ops.iter().filter(|op| **op == "play").count()
        }
    }

    impl PlayableSurface for MockSurface {
        fn set_source(&mut self, _source: &str) -> Result<(), PlayError> {
            self.ops.push("load");
            self.paused = true;
            self.ended = false;
            self.time = Duration::ZERO;
            Ok(())
        }

        fn play(&mut self) -> Result<(), PlayError> {
            self.ops.push("play");
            if self.block_play {
                return Err(PlayError::Blocked("autoplay denied".to_string()));
            }
            self.paused = false;
            Ok(())
        }

        fn pause(&mut self) -> Result<(), PlayError> {
            self.paused = true;
            Ok(())
        }

        fn current_time(&self) -> Duration {
            self.time
        }

        fn seek(&mut self, position: Duration) -> Result<(), PlayError> {
            self.ops.push("seek");
            self.time = position;
            self.ended = false;
            Ok(())
        }

        fn ready_state(&self) -> ReadyState {
            self.ready
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn has_ended(&self) -> bool {
            self.ended
        }
    }

    fn active(surface: MockSurface) -> PlaybackResumer<MockSurface> {
        let mut resumer = PlaybackResumer::new(surface);
        resumer.set_video(true);
        resumer
    }

    #[test]
    fn test_inactive_resumer_ignores_triggers() {
        let mut resumer = PlaybackResumer::new(MockSurface::ready());

        resumer.on_focus();
        resumer.on_visibility(Visibility::Visible);
        resumer.on_media_event(MediaEvent::CanPlayThrough);

        assert_eq!(resumer.state(), PlaybackState::NotVideo);
        assert!(resumer.surface().ops.is_empty());
    }

    #[test]
    fn test_focus_on_ended_video_rewinds_then_plays() {
        let mut resumer = active(MockSurface {
            ended: true,
            time: Duration::from_secs(42),
            ..MockSurface::ready()
        });
        assert_eq!(resumer.state(), PlaybackState::Ended);

        resumer.on_focus();

        assert_eq!(resumer.surface().ops, vec!["seek", "play"]);
        assert_eq!(resumer.surface().current_time(), Duration::ZERO);
        assert_eq!(resumer.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_visible_resumes_but_hidden_does_not() {
        let mut resumer = active(MockSurface::ready());

        resumer.on_visibility(Visibility::Hidden);
        assert_eq!(resumer.surface().plays(), 0);

        resumer.on_visibility(Visibility::Visible);
        assert_eq!(resumer.surface().plays(), 1);
        assert_eq!(resumer.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_unready_video_waits_for_can_play_once() {
        let mut resumer = active(MockSurface {
            ready: ReadyState::HaveCurrentData,
            paused: true,
            ..Default::default()
        });

        resumer.on_focus();
        assert_eq!(resumer.surface().plays(), 0);
        assert!(resumer.is_listening(Listener::CanPlayOnce));

        resumer.on_media_event(MediaEvent::CanPlay);
        assert_eq!(resumer.surface().plays(), 1);
        assert!(!resumer.is_listening(Listener::CanPlayOnce));

        // Self-removing: a second signal does nothing
        resumer.surface_mut().paused = true;
        resumer.on_media_event(MediaEvent::CanPlay);
        assert_eq!(resumer.surface().plays(), 1);
    }

    #[test]
    fn test_can_play_through_only_plays_when_paused() {
        let mut resumer = active(MockSurface::ready());

        resumer.on_media_event(MediaEvent::CanPlayThrough);
        assert_eq!(resumer.surface().plays(), 1);

        // Already playing
        resumer.on_media_event(MediaEvent::CanPlayThrough);
        assert_eq!(resumer.surface().plays(), 1);
    }

    #[test]
    fn test_play_rejection_is_swallowed_and_retried_on_next_trigger() {
        let mut resumer = active(MockSurface {
            block_play: true,
            ..MockSurface::ready()
        });

        resumer.on_focus();
        assert_eq!(resumer.state(), PlaybackState::Paused);

        resumer.surface_mut().block_play = false;
        resumer.on_visibility(Visibility::Visible);
        assert_eq!(resumer.surface().plays(), 2);
        assert_eq!(resumer.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_listener_registration_is_symmetric() {
        let mut resumer = PlaybackResumer::new(MockSurface {
            ready: ReadyState::HaveNothing,
            paused: true,
            ..Default::default()
        });
        assert_eq!(resumer.listener_count(), 0);

        resumer.set_video(true);
        assert_eq!(resumer.listener_count(), 3);

        // Pending one-shot is dropped on teardown too
        resumer.on_focus();
        assert_eq!(resumer.listener_count(), 4);

        resumer.teardown();
        assert_eq!(resumer.listener_count(), 0);
        assert_eq!(resumer.state(), PlaybackState::NotVideo);

        resumer.on_media_event(MediaEvent::CanPlay);
        assert_eq!(resumer.surface().plays(), 0);
    }

    #[test]
    fn test_repeated_activation_does_not_duplicate_listeners() {
        let mut resumer = active(MockSurface::ready());
        resumer.set_video(true);
        assert_eq!(resumer.listener_count(), 3);
    }

    #[test]
    fn test_load_starts_playback() {
        let mut resumer = active(MockSurface::ready());
        resumer.load("/wallpapers/video/loop.mp4");
        assert_eq!(resumer.surface().ops, vec!["load", "play"]);
    }
}
