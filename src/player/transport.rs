use tokio::time::Instant;

use crate::utils::non_negative;

use super::{MediaBuffer, PlayerError};

/// Feedback reported by the playback engine underneath the widget.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Progress { played: f64, played_seconds: f64 },
    Duration(f64),
    Ended,
    Error(String),
}

/// The playback engine a [`super::Player`] drives. Calls are fire-and-forget; the engine reports
/// back through [`TransportEvent`]s, either returned from [`Transport::poll`] or injected by the
/// host.
pub trait Transport {
    fn attach(&mut self, media: &MediaBuffer) -> Result<(), PlayerError>;

    fn detach(&mut self);

    fn set_playing(&mut self, playing: bool);

    fn set_volume(&mut self, volume: f64);

    fn seek_to(&mut self, seconds: f64);

    /// The engine's own idea of the playhead, if it has one.
    fn current_time(&self) -> Option<f64>;

    fn poll(&mut self, _now: Instant) -> Vec<TransportEvent> {
        Vec::new()
    }
}

/// Transport without a decoder: the playhead advances with the clock while playing. Duration is
/// taken from the MP4 movie header when the media has one.
#[derive(Debug, Default)]
pub struct ClockTransport {
    attached: bool,
    duration: Option<f64>,
    duration_reported: bool,
    position: f64,
    resumed_at: Option<Instant>,
    volume: f64,
}

impl ClockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.resumed_at.is_some()
    }

    fn position_at(&self, now: Instant) -> f64 {
        let mut position = self.position;
        if let Some(resumed_at) = self.resumed_at {
            position += now.saturating_duration_since(resumed_at).as_secs_f64();
        }
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn clamp_seconds(&self, seconds: f64) -> f64 {
        let seconds = non_negative(seconds);
        match self.duration {
            Some(duration) => seconds.min(duration),
            None => seconds,
        }
    }
}

impl Transport for ClockTransport {
    fn attach(&mut self, media: &MediaBuffer) -> Result<(), PlayerError> {
        if media.is_empty() {
            return Err(PlayerError::PlaybackTransportError(format!(
                "{} contains no data",
                media.source
            )));
        }
        *self = Self {
            attached: true,
            duration: mp4_duration(&media.data),
            volume: self.volume,
            ..Self::default()
        };
        Ok(())
    }

    fn detach(&mut self) {
        *self = Self {
            volume: self.volume,
            ..Self::default()
        };
    }

    fn set_playing(&mut self, playing: bool) {
        if !self.attached || playing == self.is_playing() {
            return;
        }
        let now = Instant::now();
        if playing {
            // playing again after the end starts over
            if self.duration.is_some_and(|duration| self.position >= duration) {
                self.position = 0.0;
            }
            self.resumed_at = Some(now);
        } else {
            self.position = self.position_at(now);
            self.resumed_at = None;
        }
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume;
    }

    fn seek_to(&mut self, seconds: f64) {
        if !self.attached {
            return;
        }
        self.position = self.clamp_seconds(seconds);
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn current_time(&self) -> Option<f64> {
        self.attached.then(|| self.position_at(Instant::now()))
    }

    fn poll(&mut self, now: Instant) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        if !self.attached {
            return events;
        }
        if !self.duration_reported {
            self.duration_reported = true;
            events.push(TransportEvent::Duration(self.duration.unwrap_or(0.0)));
        }
        if !self.is_playing() {
            return events;
        }
        let played_seconds = self.position_at(now);
        let played = match self.duration {
            Some(duration) if duration > 0.0 => played_seconds / duration,
            _ => 0.0,
        };
        events.push(TransportEvent::Progress {
            played,
            played_seconds,
        });
        if self.duration.is_some_and(|duration| played_seconds >= duration) {
            self.position = played_seconds;
            self.resumed_at = None;
            events.push(TransportEvent::Ended);
        }
        events
    }
}

/// Reads the presentation duration in seconds from the `moov/mvhd` box of an MP4 file.
pub fn mp4_duration(data: &[u8]) -> Option<f64> {
    let moov = find_box(data, b"moov")?;
    let mvhd = find_box(moov, b"mvhd")?;
    let (timescale, duration) = match *mvhd.first()? {
        0 => (read_u32(mvhd, 12)?, u64::from(read_u32(mvhd, 16)?)),
        1 => (read_u32(mvhd, 20)?, read_u64(mvhd, 24)?),
        _ => return None,
    };
    if timescale == 0 {
        return None;
    }
    Some(duration as f64 / f64::from(timescale))
}

fn find_box<'a>(mut data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    while data.len() >= 8 {
        let (header_len, box_len) = match read_u32(data, 0)? {
            0 => (8, data.len() as u64),
            1 => (16, read_u64(data, 8)?),
            len => (8, u64::from(len)),
        };
        if box_len < header_len as u64 || box_len > data.len() as u64 {
            return None;
        }
        let box_len = box_len as usize;
        if &data[4..8] == kind {
            return Some(&data[header_len..box_len]);
        }
        data = &data[box_len..];
    }
    None
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

fn read_u64(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}
