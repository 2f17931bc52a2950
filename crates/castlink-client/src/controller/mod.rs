//! Receiver + media status state machine.
//!
//! Listens on the receiver channel, follows the first application exposing the
//! media namespace, and keeps one media channel open against its transport id.
//! Commands read the tracked ids and are routed through the matching channel.
//! A command with nothing to act on returns `Ok(None)` instead of an error.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Map, Value};
use tokio::time::Instant;

use castlink_core::error::Result;
use castlink_core::protocol::message::{
    kind, media_session_id_value, Application, MediaStatusMessage, PlayerState, ReceiverStatus,
};
use castlink_core::protocol::{namespace, Message};

use crate::config::ClientConfig;
use crate::link::{Channel, Link};

pub use state::{media_status_is_sane, MediaSession, PlaybackState, Phase, VolumeState, DEFAULT_VOLUME_STEP};

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    link: Link,
    media_sender: String,
    receiver: Channel,
    tracked: Mutex<Tracked>,
}

#[derive(Default)]
struct Tracked {
    app: Option<ActiveApp>,
    media: Option<MediaSession>,
    volume: VolumeState,
}

struct ActiveApp {
    application: Application,
    channel: Channel,
}

impl Controller {
    /// Connect to the configured device and start tracking it.
    pub async fn connect(cfg: &ClientConfig) -> Result<Self> {
        cfg.validate()?;
        let link = Link::connect(cfg).await?;
        Self::start(link, cfg)
    }

    /// Start tracking over an existing link: opens the receiver channel and
    /// asks for the receiver status.
    pub fn start(link: Link, cfg: &ClientConfig) -> Result<Self> {
        let receiver = link.open_channel(&cfg.sender.id, namespace::RECEIVER_ID, namespace::RECEIVER)?;
        let inner = Arc::new(ControllerInner {
            link,
            media_sender: cfg.sender.media_id(),
            receiver: receiver.clone(),
            tracked: Mutex::new(Tracked::default()),
        });

        let weak = Arc::downgrade(&inner);
        receiver.subscribe_filtered(Message::as_receiver_status, move |msg| {
            if let Some(inner) = weak.upgrade() {
                inner.on_receiver_status(&msg.status);
            }
        });
        receiver.send(kind::GET_STATUS, Value::Null)?;

        Ok(Self { inner })
    }

    pub fn link(&self) -> &Link {
        &self.inner.link
    }

    /// Ask the receiver for its status and wait until it has been applied.
    pub async fn refresh(&self) -> Result<()> {
        // Subscribers run before the reply resolves, so state is current here.
        self.inner
            .receiver
            .send_and_await(kind::GET_STATUS, Value::Null)
            .await
            .map(|_| ())
    }

    pub fn close(&self) {
        self.inner.link.close();
    }

    // --------------------
    // Commands
    // --------------------

    /// Set the receiver volume, clamped into [0, 1]. NaN is ignored.
    pub fn set_volume(&self, level: f64) -> Result<Option<u64>> {
        if level.is_nan() {
            tracing::debug!("set_volume(NaN) ignored");
            return Ok(None);
        }
        let level = level.clamp(0.0, 1.0);
        self.inner.tracked().volume.level = Some(level);
        self.inner
            .receiver
            .send(kind::SET_VOLUME, json!({ "volume": { "level": level } }))
            .map(Some)
    }

    pub fn volume_up(&self) -> Result<Option<u64>> {
        let level = self.inner.tracked().volume.stepped(1.0);
        self.set_volume(level)
    }

    pub fn volume_down(&self) -> Result<Option<u64>> {
        let level = self.inner.tracked().volume.stepped(-1.0);
        self.set_volume(level)
    }

    pub fn set_muted(&self, muted: bool) -> Result<Option<u64>> {
        self.inner.tracked().volume.muted = Some(muted);
        self.inner
            .receiver
            .send(kind::SET_VOLUME, json!({ "volume": { "muted": muted } }))
            .map(Some)
    }

    pub fn play(&self) -> Result<Option<u64>> {
        self.inner.media_command(kind::PLAY, |_, _| Map::new())
    }

    pub fn pause(&self) -> Result<Option<u64>> {
        self.inner.media_command(kind::PAUSE, |_, _| Map::new())
    }

    /// PAUSE while playing or buffering, PLAY while paused. An idle session
    /// has nothing to resume, so nothing is sent.
    pub fn toggle_pause(&self) -> Result<Option<u64>> {
        match self.player_state() {
            Some(PlayerState::Playing | PlayerState::Buffering) => self.pause(),
            Some(PlayerState::Paused | PlayerState::Buffered) => self.play(),
            Some(PlayerState::Idle) | None => {
                tracing::debug!("toggle_pause ignored: no active playback");
                Ok(None)
            }
        }
    }

    /// Seek to `position` seconds, clamped into [0, duration].
    ///
    /// The tracked position moves immediately; the receiver's next status
    /// update replaces it.
    pub fn seek(&self, position: f64) -> Result<Option<u64>> {
        if position.is_nan() {
            tracing::debug!("seek(NaN) ignored");
            return Ok(None);
        }
        self.inner.seek_with(|_, _| position)
    }

    /// Seek relative to the extrapolated current position.
    pub fn seek_relative(&self, delta: f64) -> Result<Option<u64>> {
        if delta.is_nan() {
            return Ok(None);
        }
        self.inner
            .seek_with(|session, now| session.position_at(now) + delta)
    }

    /// Stop the active application. No-op without one.
    pub fn stop(&self) -> Result<Option<u64>> {
        let session_id = match &self.inner.tracked().app {
            Some(app) => app.application.session_id.clone(),
            None => {
                tracing::debug!("stop ignored: no application");
                return Ok(None);
            }
        };
        self.inner
            .receiver
            .send(kind::STOP, json!({ "sessionId": session_id }))
            .map(Some)
    }

    // --------------------
    // Getters
    // --------------------

    pub fn phase(&self) -> Phase {
        match self.inner.tracked().app {
            Some(_) => Phase::ApplicationActive,
            None => Phase::NoApplication,
        }
    }

    pub fn application(&self) -> Option<Application> {
        self.inner
            .tracked()
            .app
            .as_ref()
            .map(|a| a.application.clone())
    }

    /// Media channel of the active application.
    pub fn media_channel(&self) -> Option<Channel> {
        self.inner.tracked().app.as_ref().map(|a| a.channel.clone())
    }

    pub fn media(&self) -> Option<MediaSession> {
        self.inner.tracked().media.clone()
    }

    pub fn volume(&self) -> Option<f64> {
        self.inner.tracked().volume.level
    }

    pub fn muted(&self) -> Option<bool> {
        self.inner.tracked().volume.muted
    }

    pub fn player_state(&self) -> Option<PlayerState> {
        self.inner.tracked().media.as_ref().map(MediaSession::player_state)
    }

    /// Coarse state; `Idle` without a media session.
    pub fn state(&self) -> PlaybackState {
        self.inner
            .tracked()
            .media
            .as_ref()
            .map_or(PlaybackState::Idle, MediaSession::state)
    }

    pub fn current_position(&self) -> Option<f64> {
        let now = Instant::now();
        self.inner
            .tracked()
            .media
            .as_ref()
            .map(|m| m.position_at(now))
    }

    pub fn duration(&self) -> Option<f64> {
        self.inner.tracked().media.as_ref().and_then(MediaSession::duration)
    }
}

impl ControllerInner {
    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_receiver_status(self: &Arc<Self>, status: &ReceiverStatus) {
        let mut tracked = self.tracked();
        if let Some(volume) = &status.volume {
            tracked.volume.apply(volume);
        }

        let Some(app) = status.application_with(namespace::MEDIA) else {
            if tracked.app.is_some() {
                self.retire(&mut tracked, true);
            }
            return;
        };

        if let Some(active) = tracked.app.as_mut() {
            if active.application.transport_id == app.transport_id {
                active.application = app.clone();
                return;
            }
        }

        self.retire(&mut tracked, true);
        match self.attach(app) {
            Ok(active) => tracked.app = Some(active),
            Err(e) => tracing::warn!(transport_id = %app.transport_id, error = %e, "media channel open failed"),
        }
    }

    /// Open the media channel for `app` and ask for its media status.
    fn attach(self: &Arc<Self>, app: &Application) -> Result<ActiveApp> {
        tracing::info!(
            app_id = %app.app_id,
            display_name = %app.display_name,
            transport_id = %app.transport_id,
            "application attached"
        );

        let channel = self
            .link
            .open_channel(&self.media_sender, &app.transport_id, namespace::MEDIA)?;

        let weak = Arc::downgrade(self);
        let transport_id = app.transport_id.clone();
        channel.subscribe_validated(
            Message::as_media_status,
            |msg: &MediaStatusMessage| media_status_is_sane(&msg.status),
            move |msg| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_media_status(&transport_id, msg);
                }
            },
        );

        // Remote CLOSE of the application's virtual connection.
        let weak = Arc::downgrade(self);
        let transport_id = app.transport_id.clone();
        channel.subscribe(move |msg| {
            if msg.msg_type() == kind::CLOSE {
                if let Some(inner) = weak.upgrade() {
                    inner.on_app_closed(&transport_id);
                }
            }
        });

        channel.send(kind::GET_STATUS, Value::Null)?;
        Ok(ActiveApp {
            application: app.clone(),
            channel,
        })
    }

    fn retire(&self, tracked: &mut Tracked, close_channel: bool) {
        let Some(app) = tracked.app.take() else { return };
        tracing::info!(transport_id = %app.application.transport_id, "application retired");
        if close_channel {
            app.channel.close();
        }
        tracked.media = None;
    }

    fn on_app_closed(&self, transport_id: &str) {
        let mut tracked = self.tracked();
        let current = tracked
            .app
            .as_ref()
            .is_some_and(|a| a.application.transport_id == transport_id);
        if current {
            // The link drops the channel itself after a remote CLOSE.
            self.retire(&mut tracked, false);
        }
    }

    fn on_media_status(&self, transport_id: &str, msg: &MediaStatusMessage) {
        let mut tracked = self.tracked();
        let current = tracked
            .app
            .as_ref()
            .is_some_and(|a| a.application.transport_id == transport_id);
        if !current {
            tracing::debug!(transport_id, "stale media status dropped");
            return;
        }

        let now = Instant::now();
        let Some(status) = msg.status.first() else {
            if tracked.media.take().is_some() {
                tracing::info!("media session ended");
            }
            return;
        };

        match tracked.media.as_mut() {
            Some(session) if session.session_id() == status.media_session_id => {
                session.merge(status, now);
            }
            _ => {
                tracing::info!(
                    media_session_id = %status.media_session_id,
                    player_state = status.player_state.as_str(),
                    "media session tracked"
                );
                tracked.media = Some(MediaSession::from_status(status, now));
            }
        }
    }

    /// Send a media-namespace command for the tracked session.
    fn media_command<F>(&self, msg_type: &str, prepare: F) -> Result<Option<u64>>
    where
        F: FnOnce(&mut MediaSession, Instant) -> Map<String, Value>,
    {
        let (channel, body) = {
            let mut guard = self.tracked();
            let tracked = &mut *guard;
            let (Some(app), Some(session)) = (tracked.app.as_ref(), tracked.media.as_mut()) else {
                tracing::debug!(msg_type, "command ignored: no media session");
                return Ok(None);
            };
            let mut body = prepare(session, Instant::now());
            body.insert("mediaSessionId".into(), media_session_id_value(session.session_id()));
            (app.channel.clone(), Value::Object(body))
        };
        channel.send(msg_type, body).map(Some)
    }

    fn seek_with<F>(&self, target: F) -> Result<Option<u64>>
    where
        F: FnOnce(&MediaSession, Instant) -> f64,
    {
        self.media_command(kind::SEEK, |session, now| {
            let position = session.clamp_seek(target(session, now));
            session.seek_to(position, now);

            let mut body = Map::new();
            body.insert("currentTime".into(), Value::from(position));
            body.insert("resumeState".into(), Value::from("PLAYBACK_UNCHANGED"));
            body
        })
    }
}
