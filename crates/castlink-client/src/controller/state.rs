//! Tracked receiver/media state, independent of the link.
//!
//! Every method that depends on wall-clock takes `now` explicitly, so the
//! controller decides which clock is in effect.

use tokio::time::Instant;

use castlink_core::protocol::message::{MediaInformation, MediaStatus, PlayerState, Volume};

/// Step used by volume up/down when the receiver does not report one.
pub const DEFAULT_VOLUME_STEP: f64 = 0.05;

/// Whether an application exposing the media namespace is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NoApplication,
    ApplicationActive,
}

/// Four-state view of the player for callers that do not care about buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackState::Idle => "IDLE",
            PlaybackState::Loading => "LOADING",
            PlaybackState::Playing => "PLAYING",
            PlaybackState::Paused => "PAUSED",
        }
    }
}

impl From<PlayerState> for PlaybackState {
    fn from(state: PlayerState) -> Self {
        match state {
            PlayerState::Idle => PlaybackState::Idle,
            PlayerState::Buffering | PlayerState::Buffered => PlaybackState::Loading,
            PlayerState::Playing => PlaybackState::Playing,
            PlayerState::Paused => PlaybackState::Paused,
        }
    }
}

/// Receiver volume as last reported (or optimistically set).
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeState {
    pub level: Option<f64>,
    pub muted: Option<bool>,
    pub step_interval: f64,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            level: None,
            muted: None,
            step_interval: DEFAULT_VOLUME_STEP,
        }
    }
}

impl VolumeState {
    /// Merge a (possibly partial) volume block.
    pub fn apply(&mut self, update: &Volume) {
        if let Some(level) = update.level.filter(|l| l.is_finite()) {
            self.level = Some(level.clamp(0.0, 1.0));
        }
        if let Some(muted) = update.muted {
            self.muted = Some(muted);
        }
        if let Some(step) = update.step_interval.filter(|s| s.is_finite() && *s > 0.0) {
            self.step_interval = step;
        }
    }

    /// Level one step away from the current one, clamped into [0, 1].
    pub fn stepped(&self, steps: f64) -> f64 {
        (self.level.unwrap_or(0.0) + steps * self.step_interval).clamp(0.0, 1.0)
    }
}

/// One media session on the active application.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSession {
    session_id: String,
    player_state: PlayerState,
    position: f64,
    captured_at: Instant,
    media: Option<MediaInformation>,
    idle_reason: Option<String>,
    supported_commands: Option<u64>,
}

impl MediaSession {
    pub fn from_status(status: &MediaStatus, now: Instant) -> Self {
        Self {
            session_id: status.media_session_id.clone(),
            player_state: status.player_state,
            position: status.current_time.unwrap_or(0.0),
            captured_at: now,
            media: status.media.clone(),
            idle_reason: status.idle_reason.clone(),
            supported_commands: status.supported_media_commands,
        }
    }

    /// Merge an update for the same session.
    ///
    /// The reported `currentTime` becomes the new anchor. Without one, the
    /// extrapolated position is carried over under the previous state.
    /// Media info fields missing from the update keep their tracked values.
    pub fn merge(&mut self, status: &MediaStatus, now: Instant) {
        self.position = match status.current_time {
            Some(t) => t,
            None => self.position_at(now),
        };
        self.captured_at = now;
        self.player_state = status.player_state;
        self.idle_reason = status.idle_reason.clone();
        if status.supported_media_commands.is_some() {
            self.supported_commands = status.supported_media_commands;
        }

        if let Some(update) = &status.media {
            let previous = self.media.take();
            let mut media = update.clone();
            if let Some(prev) = previous {
                if media.duration.is_none() {
                    media.duration = prev.duration;
                }
                if media.metadata.is_none() {
                    media.metadata = prev.metadata;
                }
                if media.content_id.is_empty() {
                    media.content_id = prev.content_id;
                }
            }
            self.media = Some(media);
        }
    }

    /// Position at `now`: extrapolated only while playing.
    pub fn position_at(&self, now: Instant) -> f64 {
        match self.player_state {
            PlayerState::Playing => {
                self.position + now.saturating_duration_since(self.captured_at).as_secs_f64()
            }
            _ => self.position,
        }
    }

    /// Optimistic local update ahead of the receiver's confirmation.
    pub fn seek_to(&mut self, position: f64, now: Instant) {
        self.position = position;
        self.captured_at = now;
    }

    /// Clamp a seek target into [0, duration]; the upper bound applies only
    /// when the duration is known.
    pub fn clamp_seek(&self, target: f64) -> f64 {
        let target = target.max(0.0);
        match self.duration() {
            Some(duration) => target.min(duration),
            None => target,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn player_state(&self) -> PlayerState {
        self.player_state
    }

    pub fn state(&self) -> PlaybackState {
        self.player_state.into()
    }

    pub fn duration(&self) -> Option<f64> {
        self.media
            .as_ref()
            .and_then(|m| m.duration)
            .filter(|d| d.is_finite() && *d >= 0.0)
    }

    pub fn media(&self) -> Option<&MediaInformation> {
        self.media.as_ref()
    }

    pub fn title(&self) -> Option<&str> {
        self.media
            .as_ref()
            .and_then(|m| m.metadata.as_ref())
            .and_then(|md| md.title.as_deref())
    }

    pub fn idle_reason(&self) -> Option<&str> {
        self.idle_reason.as_deref()
    }

    pub fn supported_commands(&self) -> Option<u64> {
        self.supported_commands
    }
}

/// Sanity check applied to MEDIA_STATUS before it reaches the state machine.
pub fn media_status_is_sane(statuses: &[MediaStatus]) -> bool {
    statuses.iter().all(|s| {
        s.current_time.map_or(true, |t| t.is_finite() && t >= 0.0)
            && !s.media_session_id.is_empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn status(id: &str, state: PlayerState, t: Option<f64>) -> MediaStatus {
        MediaStatus {
            media_session_id: id.into(),
            player_state: state,
            current_time: t,
            playback_rate: None,
            supported_media_commands: None,
            volume: None,
            media: None,
            idle_reason: None,
            current_item_id: None,
        }
    }

    #[test]
    fn merge_without_time_carries_extrapolated_position() {
        let t0 = Instant::now();
        let mut s = MediaSession::from_status(&status("1", PlayerState::Playing, Some(4.0)), t0);
        let t1 = t0 + Duration::from_secs(3);
        s.merge(&status("1", PlayerState::Paused, None), t1);
        assert_eq!(s.position_at(t1 + Duration::from_secs(60)), 7.0);
        assert_eq!(s.state(), PlaybackState::Paused);
    }

    #[test]
    fn merge_keeps_duration_missing_from_update() {
        let t0 = Instant::now();
        let mut first = status("1", PlayerState::Playing, Some(0.0));
        first.media = Some(MediaInformation {
            duration: Some(120.0),
            ..Default::default()
        });
        let mut s = MediaSession::from_status(&first, t0);

        let mut update = status("1", PlayerState::Playing, Some(1.0));
        update.media = Some(MediaInformation::default());
        s.merge(&update, t0);
        assert_eq!(s.duration(), Some(120.0));
    }

    #[test]
    fn buffering_maps_to_loading() {
        assert_eq!(PlaybackState::from(PlayerState::Buffering), PlaybackState::Loading);
        assert_eq!(PlaybackState::from(PlayerState::Buffered), PlaybackState::Loading);
        assert_eq!(PlaybackState::Loading.as_str(), "LOADING");
    }

    #[test]
    fn volume_step_clamps() {
        let mut v = VolumeState::default();
        v.apply(&Volume {
            level: Some(0.98),
            step_interval: Some(0.1),
            ..Default::default()
        });
        assert_eq!(v.stepped(1.0), 1.0);
        assert!((v.stepped(-1.0) - 0.88).abs() < 1e-9);
    }
}
