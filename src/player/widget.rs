use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::utils::{clamp_unit, non_negative};

use super::{
    FullscreenPlatform, MediaBuffer, MediaSource, PlaybackState, PlayerConfig, PlayerError,
    PlayerId, PlayerPhase, Transport, TransportEvent,
};

const UNMUTE_FALLBACK_VOLUME: f64 = 0.5;

/// Identifies one load attempt; results carrying an older generation are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub generation: u64,
    pub source: MediaSource,
}

/// Playback state machine for a single media source.
///
/// `Uninitialized -> Loading -> Ready -> (new source) -> Loading`, with `Loading -> Failed` on a
/// load error. Playing/paused, scrubbing and fullscreen are flags on top of `Ready`.
///
/// While [`PlaybackState::is_scrubbing`] is set only user seeks write the playhead; otherwise
/// only transport progress does.
#[derive(Debug)]
pub struct Player<T> {
    id: PlayerId,
    config: PlayerConfig,
    phase: PlayerPhase,
    source: Option<MediaSource>,
    generation: u64,
    state: PlaybackState,
    stored_volume: f64,
    controls_deadline: Option<Instant>,
    media: Option<MediaBuffer>,
    transport: T,
}

impl<T: Transport> Player<T> {
    pub fn new(mut transport: T, config: PlayerConfig) -> Self {
        let state = PlaybackState::new(config.initial_volume);
        transport.set_volume(state.volume);
        Self {
            id: PlayerId::new(),
            config,
            phase: PlayerPhase::Uninitialized,
            source: None,
            generation: 0,
            stored_volume: state.volume,
            state,
            controls_deadline: None,
            media: None,
            transport,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn phase(&self) -> &PlayerPhase {
        &self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    pub fn media(&self) -> Option<&MediaBuffer> {
        self.media.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transport controls are only offered once media is loaded.
    pub fn controls_available(&self) -> bool {
        self.phase.is_ready()
    }

    pub fn controls_deadline(&self) -> Option<Instant> {
        self.controls_deadline
    }

    pub fn initialize(&mut self, source: MediaSource) -> LoadTicket {
        self.release_media();
        self.generation += 1;
        self.state = self.state.reset_for_source();
        self.phase = PlayerPhase::Loading;
        self.source = Some(source.clone());
        info!("Player {}: loading {source}", self.id);
        LoadTicket {
            generation: self.generation,
            source,
        }
    }

    /// Applies the outcome of a load. Returns `false` if the result belonged to a superseded
    /// load and was dropped.
    pub fn complete_load(
        &mut self,
        generation: u64,
        result: Result<MediaBuffer, PlayerError>,
    ) -> bool {
        if generation != self.generation || self.phase != PlayerPhase::Loading {
            debug!(
                "Player {}: discarding result of superseded load {generation}",
                self.id
            );
            return false;
        }

        let media = match result {
            Ok(media) => media,
            Err(err) => {
                self.fail(err);
                return true;
            }
        };
        if let Err(err) = self.transport.attach(&media) {
            self.fail(err);
            return true;
        }
        self.transport.set_volume(self.state.volume);
        self.transport.set_playing(false);

        info!(
            "Player {}: loaded {} bytes from {}",
            self.id,
            media.len(),
            media.source
        );
        self.media = Some(media);
        self.phase = PlayerPhase::Ready;
        self.state.media_ready = true;
        self.state.is_playing = false;
        self.state.controls_visible = true;
        true
    }

    /// Stops playback, drops the loaded media and invalidates any pending load.
    pub fn release(&mut self) {
        self.release_media();
        self.generation += 1;
        self.phase = PlayerPhase::Uninitialized;
        self.source = None;
    }

    pub fn toggle_playback(&mut self, now: Instant) -> bool {
        if !self.phase.is_ready() {
            debug!("Player {}: ignoring play/pause, media not ready", self.id);
            return false;
        }
        let playing = !self.state.is_playing;
        self.state.is_playing = playing;
        self.transport.set_playing(playing);
        if playing {
            self.restart_controls_timer(now);
        } else {
            self.pin_controls();
        }
        true
    }

    pub fn seek_relative(&mut self, delta_seconds: f64) {
        if !self.phase.is_ready() || !delta_seconds.is_finite() {
            return;
        }
        let base = self
            .transport
            .current_time()
            .unwrap_or(self.state.current_time_seconds);
        let target = (non_negative(base) + delta_seconds).clamp(0.0, self.state.duration_seconds);
        self.state.set_position_seconds(target);
        self.transport.seek_to(target);
    }

    pub fn seek_to_fraction(&mut self, fraction: f64) {
        if !self.phase.is_ready() {
            return;
        }
        self.state.set_position_fraction(fraction);
        self.transport.seek_to(self.state.current_time_seconds);
    }

    pub fn set_volume(&mut self, level: f64) {
        let volume = clamp_unit(level);
        if volume > 0.0 {
            self.stored_volume = volume;
        }
        self.apply_volume(volume);
    }

    pub fn toggle_mute(&mut self) {
        let volume = if self.state.volume > 0.0 {
            self.stored_volume = self.state.volume;
            0.0
        } else if self.stored_volume > 0.0 {
            self.stored_volume
        } else {
            UNMUTE_FALLBACK_VOLUME
        };
        self.apply_volume(volume);
    }

    pub fn begin_scrub(&mut self) {
        if !self.phase.is_ready() {
            return;
        }
        self.state.is_scrubbing = true;
        self.state.controls_visible = true;
    }

    pub fn end_scrub(&mut self, now: Instant) {
        if !self.state.is_scrubbing {
            return;
        }
        self.state.is_scrubbing = false;
        self.transport.seek_to(self.state.current_time_seconds);
        if self.state.is_playing {
            self.restart_controls_timer(now);
        }
    }

    pub fn toggle_fullscreen(
        &mut self,
        platform: &mut dyn FullscreenPlatform,
    ) -> Result<(), PlayerError> {
        if platform.is_fullscreen() {
            platform.exit_fullscreen();
            return Ok(());
        }
        if let Err(err) = platform.request_fullscreen() {
            error!("Player {}: {err}", self.id);
            return Err(err);
        }
        Ok(())
    }

    pub fn on_fullscreen_changed(&mut self, active: bool) {
        self.state.is_fullscreen = active;
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Error(message) => {
                if matches!(self.phase, PlayerPhase::Loading | PlayerPhase::Ready) {
                    self.fail(PlayerError::PlaybackTransportError(message));
                }
            }
            _ if !self.phase.is_ready() => {}
            TransportEvent::Progress {
                played,
                played_seconds,
            } => {
                if self.state.is_scrubbing {
                    return;
                }
                self.state.played_fraction = clamp_unit(played);
                self.state.current_time_seconds = non_negative(played_seconds);
            }
            TransportEvent::Duration(duration) => {
                self.state.duration_seconds = non_negative(duration);
                if self.state.is_scrubbing {
                    self.state
                        .set_position_fraction(self.state.played_fraction);
                } else {
                    self.state
                        .set_position_seconds(self.state.current_time_seconds);
                }
            }
            TransportEvent::Ended => {
                self.state.is_playing = false;
                self.transport.set_playing(false);
                self.pin_controls();
            }
        }
    }

    /// Pulls pending events out of the transport.
    pub fn poll_transport(&mut self, now: Instant) {
        if !self.phase.is_ready() {
            return;
        }
        for event in self.transport.poll(now) {
            self.on_transport_event(event);
        }
    }

    /// Pointer movement or touch inside the widget.
    pub fn pointer_activity(&mut self, now: Instant) {
        self.restart_controls_timer(now);
    }

    pub fn pointer_entered(&mut self) {
        self.state.controls_visible = true;
    }

    pub fn pointer_left(&mut self) {
        if self.state.is_playing && !self.state.is_scrubbing {
            self.state.controls_visible = false;
            self.controls_deadline = None;
        }
    }

    pub fn poll_controls_timer(&mut self, now: Instant) {
        let Some(deadline) = self.controls_deadline else {
            return;
        };
        if now < deadline {
            return;
        }
        self.controls_deadline = None;
        if self.state.is_playing && !self.state.is_scrubbing {
            self.state.controls_visible = false;
        }
    }

    fn restart_controls_timer(&mut self, now: Instant) {
        self.state.controls_visible = true;
        self.controls_deadline = Some(now + self.config.controls_hide_delay());
    }

    fn pin_controls(&mut self) {
        self.state.controls_visible = true;
        self.controls_deadline = None;
    }

    fn apply_volume(&mut self, volume: f64) {
        self.state.volume = volume;
        self.transport.set_volume(volume);
    }

    fn fail(&mut self, err: PlayerError) {
        warn!("Player {}: {err}", self.id);
        self.release_media();
        self.phase = PlayerPhase::Failed(err);
    }

    fn release_media(&mut self) {
        self.transport.detach();
        self.media = None;
        self.state.is_playing = false;
        self.state.is_scrubbing = false;
        self.state.media_ready = false;
        self.pin_controls();
    }
}
