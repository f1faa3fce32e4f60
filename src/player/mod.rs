//! Headless video player widget.
//!
//! [`Player`] is the synchronous state machine; [`PlayerController`] runs one player per tokio
//! task and is driven through a [`PlayerHandle`].

use std::{fmt::Display, sync::Arc, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use crate::id_type;

mod controller;
mod fetch;
mod fullscreen;
mod state;
mod transport;
mod widget;

pub use controller::{PlayerCommand, PlayerController, PlayerHandle, PlayerView};
pub use fetch::{HttpFetcher, MediaFetcher};
pub use fullscreen::{FullscreenListener, FullscreenPlatform, VirtualFullscreen};
pub use state::{format_time, PlaybackState, PlayerPhase};
pub use transport::{mp4_duration, ClockTransport, Transport, TransportEvent};
pub use widget::{LoadTicket, Player};

id_type!(PlayerId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("Failed to load media: {0}")]
    LoadFailure(String),

    #[error("Fullscreen request was denied: {0}")]
    FullscreenRequestFailure(String),

    #[error("Playback transport error: {0}")]
    PlaybackTransportError(String),
}

/// Locator of a single video resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaSource(Arc<str>);

impl MediaSource {
    pub fn new(url: impl AsRef<str>) -> Self {
        Self(Arc::from(url.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully downloaded media, owned by the player until the source changes or the player is torn
/// down.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBuffer {
    pub source: MediaSource,
    pub data: Vec<u8>,
}

impl MediaBuffer {
    pub fn new(source: MediaSource, data: Vec<u8>) -> Self {
        Self { source, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub controls_hide_delay_ms: u64,
    pub seek_step_secs: f64,
    pub initial_volume: f64,
    pub progress_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            controls_hide_delay_ms: 3000,
            seek_step_secs: 10.0,
            initial_volume: 0.5,
            progress_interval_ms: 1000,
        }
    }
}

impl PlayerConfig {
    pub fn controls_hide_delay(&self) -> Duration {
        Duration::from_millis(self.controls_hide_delay_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        // tokio intervals panic on a zero period
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}
