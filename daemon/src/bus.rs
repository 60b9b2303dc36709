//! Desktop event bus.
//!
//! Producers (IPC server, persisted settings) and the desktop runtime never
//! hold references to each other; they only share an [`EventBus`]. Every
//! published event is stamped with a sequence number so consumers can tell
//! which notification is the most recent.

use common::{Visibility, WallpaperReference};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 64;

/// Events published on the desktop bus
#[derive(Debug, Clone, PartialEq)]
pub enum DesktopEvent {
    /// A new wallpaper was chosen
    WallpaperChanged(WallpaperReference),
    /// Page visibility changed
    VisibilityChanged(Visibility),
    /// The desktop window received focus
    FocusGained,
    /// An icon was clicked
    IconSelected(String),
    /// An icon was double clicked
    IconOpened(String),
    /// The empty desktop background was clicked
    BackgroundClicked,
}

/// A published event together with its position in the publish order
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub seq: u64,
    pub event: DesktopEvent,
}

/// Process-wide publish/subscribe channel for [`DesktopEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    next_seq: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            sender,
            next_seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the sequence number assigned to the event. Publishing with no
    /// subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, event: DesktopEvent) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        log::debug!("Publishing event #{}: {:?}", seq, event);

        if self.sender.send(Envelope { seq, event }).is_err() {
            log::debug!("No subscribers for event #{}", seq);
        }
        seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
