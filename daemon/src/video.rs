//! GStreamer-backed video wallpaper surface.
//!
//! Wraps a `playbin` element behind [`PlayableSurface`]. A bus watcher
//! thread turns pipeline messages into [`MediaEvent`]s for the runtime and
//! tracks end-of-stream.

use anyhow::{Context, Result};
use common::ReadyState;
use gstreamer as gst;
use gstreamer::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::resumer::{MediaEvent, PlayError, PlayableSurface};

const BUS_POLL_MS: u64 = 200;

pub struct GstSurface {
    playbin: gst::Element,
    ended: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
}

impl GstSurface {
    /// Build a muted-or-not `playbin` rendering into `sink`
    pub fn new(
        sink: &str,
        muted: bool,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Self> {
        gst::init().context("Failed to initialize GStreamer")?;

        let playbin = gst::ElementFactory::make("playbin")
            .name("wallpaper")
            .build()
            .context("Failed to create playbin")?;

        let video_sink = gst::ElementFactory::make(sink)
            .build()
            .with_context(|| format!("Failed to create video sink: {}", sink))?;

        playbin.set_property("video-sink", &video_sink);
        playbin.set_property("mute", muted);

        let bus = playbin.bus().context("playbin has no bus")?;
        let ended = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let bus_thread = {
            let ended = Arc::clone(&ended);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("video-bus".to_string())
                .spawn(move || watch_bus(bus, ended, stop, events))
                .context("Failed to spawn video bus thread")?
        };

        log::info!("Video surface ready (sink: {}, muted: {})", sink, muted);

        Ok(Self {
            playbin,
            ended,
            stop,
            bus_thread: Some(bus_thread),
        })
    }
}

fn watch_bus(
    bus: gst::Bus,
    ended: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<MediaEvent>,
) {
    while !stop.load(Ordering::Relaxed) {
        let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(BUS_POLL_MS)) else {
            continue;
        };

        match msg.view() {
            gst::MessageView::Eos(..) => {
                log::debug!("Video wallpaper reached end of stream");
                ended.store(true, Ordering::Release);
                let _ = events.send(MediaEvent::Ended);
            }
            gst::MessageView::AsyncDone(..) => {
                // Prerolled: data is buffered and playback can start
                let _ = events.send(MediaEvent::CanPlay);
                let _ = events.send(MediaEvent::CanPlayThrough);
            }
            gst::MessageView::Error(err) => {
                log::warn!(
                    "Video pipeline error from {:?}: {}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                );
            }
            _ => {}
        }
    }
}

/// Absolute paths become `file://` URIs, everything else is passed through
fn to_uri(source: &str) -> String {
    if source.starts_with('/') {
        format!("file://{}", source)
    } else {
        source.to_string()
    }
}

impl PlayableSurface for GstSurface {
    fn set_source(&mut self, source: &str) -> Result<(), PlayError> {
        self.playbin
            .set_state(gst::State::Null)
            .map_err(|e| PlayError::Failed(e.to_string()))?;

        self.ended.store(false, Ordering::Release);
        self.playbin.set_property("uri", to_uri(source));

        // Preroll so readiness is reported on the bus
        self.playbin
            .set_state(gst::State::Paused)
            .map_err(|e| PlayError::Failed(e.to_string()))?;

        log::info!("Loaded video wallpaper: {}", source);
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayError> {
        self.playbin
            .set_state(gst::State::Playing)
            .map_err(|e| PlayError::Blocked(e.to_string()))?;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayError> {
        self.playbin
            .set_state(gst::State::Paused)
            .map_err(|e| PlayError::Failed(e.to_string()))?;
        Ok(())
    }

    fn current_time(&self) -> Duration {
        self.playbin
            .query_position::<gst::ClockTime>()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or_default()
    }

    fn seek(&mut self, position: Duration) -> Result<(), PlayError> {
        let target = gst::ClockTime::from_nseconds(position.as_nanos() as u64);
        self.playbin
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT, target)
            .map_err(|e| PlayError::Failed(e.to_string()))?;
        self.ended.store(false, Ordering::Release);
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        match self.playbin.current_state() {
            gst::State::Playing => ReadyState::HaveEnoughData,
            gst::State::Paused => ReadyState::HaveFutureData,
            gst::State::Ready => ReadyState::HaveMetadata,
            _ => ReadyState::HaveNothing,
        }
    }

    fn is_paused(&self) -> bool {
        self.playbin.current_state() != gst::State::Playing
    }

    fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

impl Drop for GstSurface {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            log::warn!("Failed to stop video pipeline: {}", e);
        }
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }
    }
}
