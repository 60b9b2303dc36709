mod bus;
mod config;
mod desktop;
mod ipc_server;
mod macros;
mod resolver;
mod resumer;
mod runtime;
mod settings;
mod storage;
mod tracker;

#[cfg(feature = "video")]
mod video;

use anyhow::Result;
use common::{DesktopView, WallpaperReference};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::bus::EventBus;
use crate::resumer::{MediaEvent, PlaybackResumer};
use crate::runtime::{DesktopRuntime, VideoResumer};
use crate::settings::WallpaperSettings;
use crate::storage::{DirectoryStore, MemoryStore, WallpaperStore};

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = config::Config::load();
    let log_level = loaded
        .as_ref()
        .map(|cfg| cfg.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("Starting desktop wallpaper daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = match loaded {
        Ok(cfg) => {
            log::info!("✓ Configuration loaded");
            log::info!("    - Log level: {}", cfg.general.log_level);
            log::info!(
                "    - Initial wallpaper: {}",
                cfg.wallpaper.initial.as_deref().unwrap_or("(none)")
            );
            log::info!("    - Storage prefix: {}", cfg.wallpaper.storage_prefix);
            log::info!("    - Desktop icons: {}", cfg.desktop.icons.len());
            log::info!(
                "    - Video: {}",
                if cfg.video.enabled { "enabled" } else { "disabled" }
            );
            cfg
        }
        Err(e) => {
            log::warn!("Failed to load config: {:#}. Using defaults.", e);
            config::Config::default()
        }
    };

    let bus = EventBus::new();

    let store: Arc<dyn WallpaperStore> = match config.storage_dir() {
        Ok(dir) => {
            log::info!("Wallpaper storage: {}", dir.display());
            Arc::new(DirectoryStore::new(
                config.wallpaper.storage_prefix.clone(),
                dir,
            ))
        }
        Err(e) => {
            log::warn!("No wallpaper storage directory: {:#}. Imports kept in memory.", e);
            Arc::new(MemoryStore::new(config.wallpaper.storage_prefix.clone()))
        }
    };

    let initial = config
        .wallpaper
        .initial
        .clone()
        .map(WallpaperReference::new);

    let settings = match WallpaperSettings::default_path().and_then(|path| {
        WallpaperSettings::load(Some(path), initial.clone().unwrap_or_default(), bus.clone())
    }) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Failed to load wallpaper settings: {:#}. Not persisting.", e);
            WallpaperSettings::load(None, initial.clone().unwrap_or_default(), bus.clone())?
        }
    };
    let settings = Arc::new(settings);
    log::info!("Current wallpaper: {}", settings.current());

    let (tracker, resolved_rx) =
        tracker::WallpaperTracker::new(Arc::clone(&store), config.wallpaper.storage_prefix.clone());
    let desktop = desktop::DesktopSurface::new(&config.desktop);

    let (media_tx, media_rx) = mpsc::unbounded_channel();
    let resumer = build_video_resumer(&config.video, media_tx);

    let mut runtime = DesktopRuntime::new(
        tracker,
        resolved_rx,
        desktop,
        Arc::clone(&settings),
        resumer,
        media_rx,
    );
    runtime.start(initial);

    let (shutdown_tx, _) = watch::channel(false);
    let state = Arc::new(DaemonState::new(
        bus.clone(),
        settings,
        store,
        runtime.subscribe(),
        shutdown_tx,
    ));

    // Start desktop runtime
    let runtime_handle = tokio::spawn(runtime.run(bus.subscribe(), state.shutdown_signal()));

    // Start IPC server
    let ipc_state = state.clone();
    let ipc_handle = tokio::spawn(async move {
        log_and_continue!(ipc_server::start(ipc_state).await, "run IPC server");
    });

    // Set up signal handlers
    let signal_state = state.clone();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    log::error!("Failed to set up signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM, shutting down...");
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT, shutting down...");
            }
        }

        signal_state.request_exit();
    });

    // Wait for either task to complete
    tokio::select! {
        _ = ipc_handle => {
            log::info!("IPC server stopped");
        }
        result = runtime_handle => {
            match result {
                Ok(Err(e)) => log::error!("Desktop runtime error: {}", e),
                Err(e) => log::error!("Desktop runtime panicked: {}", e),
                Ok(Ok(())) => log::info!("Desktop runtime stopped"),
            }
        }
    }

    log::info!("Daemon shutting down");
    Ok(())
}

#[cfg(feature = "video")]
fn build_video_resumer(
    settings: &config::VideoSettings,
    media_tx: mpsc::UnboundedSender<MediaEvent>,
) -> Option<VideoResumer> {
    if !settings.enabled {
        log::info!("Video wallpapers disabled in config");
        return None;
    }

    match video::GstSurface::new(&settings.sink, settings.muted, media_tx) {
        Ok(surface) => Some(PlaybackResumer::new(Box::new(surface))),
        Err(e) => {
            log::warn!("Video playback unavailable: {:#}", e);
            None
        }
    }
}

#[cfg(not(feature = "video"))]
fn build_video_resumer(
    _settings: &config::VideoSettings,
    _media_tx: mpsc::UnboundedSender<MediaEvent>,
) -> Option<VideoResumer> {
    log::info!("Video playback not compiled (build with --features video to enable)");
    None
}

/// State shared between the IPC server and the rest of the daemon
pub struct DaemonState {
    pub start_time: std::time::Instant,
    pub bus: EventBus,
    pub settings: Arc<WallpaperSettings>,
    pub store: Arc<dyn WallpaperStore>,
    pub view: watch::Receiver<DesktopView>,
    shutdown: watch::Sender<bool>,
}

impl DaemonState {
    fn new(
        bus: EventBus,
        settings: Arc<WallpaperSettings>,
        store: Arc<dyn WallpaperStore>,
        view: watch::Receiver<DesktopView>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            bus,
            settings,
            store,
            view,
            shutdown,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn should_exit(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn request_exit(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }
}
