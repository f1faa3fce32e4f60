use crate::utils::{clamp_unit, non_negative};

use super::PlayerError;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerPhase {
    Uninitialized,
    Loading,
    Ready,
    Failed(PlayerError),
}

impl PlayerPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub volume: f64,
    pub played_fraction: f64,
    pub duration_seconds: f64,
    pub current_time_seconds: f64,
    pub is_fullscreen: bool,
    pub is_scrubbing: bool,
    pub controls_visible: bool,
    pub media_ready: bool,
}

impl PlaybackState {
    pub fn new(volume: f64) -> Self {
        Self {
            is_playing: false,
            volume: clamp_unit(volume),
            played_fraction: 0.0,
            duration_seconds: 0.0,
            current_time_seconds: 0.0,
            is_fullscreen: false,
            is_scrubbing: false,
            controls_visible: true,
            media_ready: false,
        }
    }

    /// Playback state for a freshly selected source. Volume and fullscreen carry over since they
    /// belong to the viewer and the platform rather than to the media.
    pub(super) fn reset_for_source(&self) -> Self {
        Self {
            is_fullscreen: self.is_fullscreen,
            ..Self::new(self.volume)
        }
    }

    /// Fraction of `seconds` within the known duration; 0 while the duration is unknown.
    pub fn fraction_of(&self, seconds: f64) -> f64 {
        if self.duration_seconds > 0.0 {
            clamp_unit(seconds / self.duration_seconds)
        } else {
            0.0
        }
    }

    pub(super) fn set_position_seconds(&mut self, seconds: f64) {
        self.current_time_seconds = non_negative(seconds);
        self.played_fraction = self.fraction_of(self.current_time_seconds);
    }

    pub(super) fn set_position_fraction(&mut self, fraction: f64) {
        self.played_fraction = clamp_unit(fraction);
        self.current_time_seconds = self.played_fraction * self.duration_seconds;
    }

    pub fn elapsed_label(&self) -> String {
        format_time(self.current_time_seconds)
    }

    pub fn duration_label(&self) -> String {
        format_time(self.duration_seconds)
    }
}

/// Formats seconds as `m:ss`, truncating to whole seconds.
pub fn format_time(seconds: f64) -> String {
    let total = non_negative(seconds).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
