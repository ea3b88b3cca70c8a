use crate::media::{MediaElement, MediaError, MediaEvent};
use crate::station::{StationError, StationInfo, StationSource};
use crate::status::{hint, Status, StatusLine};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Keeps the status line and the play/pause button in step with a media
/// element. Owned by the UI loop; every handler takes `&mut self`.
pub struct Controller<M: MediaElement> {
    media: Arc<M>,
    stream_url: Option<String>,
    station_name: Option<String>,
    line: StatusLine,
    button_enabled: bool,
    button_playing: bool,
    loading: bool,
}

impl<M: MediaElement> Controller<M> {
    pub fn new(media: Arc<M>, volume: f32) -> Self {
        let volume = volume.clamp(0.0, 1.0);
        media.set_volume(volume);

        Self {
            media,
            stream_url: None,
            station_name: None,
            line: StatusLine::new(Status::Init, hint::BOOTING),
            button_enabled: false,
            button_playing: false,
            loading: false,
        }
    }

    pub fn status_line(&self) -> &StatusLine {
        &self.line
    }

    pub fn is_enabled(&self) -> bool {
        self.button_enabled
    }

    /// True when the button offers "pause".
    pub fn shows_pause(&self) -> bool {
        self.button_playing
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Current volume, as applied to the media element.
    pub fn volume(&self) -> f32 {
        self.media.volume()
    }

    pub fn station_name(&self) -> Option<&str> {
        self.station_name.as_deref()
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.stream_url.as_deref()
    }

    fn set_status(&mut self, status: Status, hint: &str) {
        self.line = StatusLine::new(status, hint);
    }

    // ── startup ─────────────────────────────────────────────────────────────

    pub fn begin_fetch(&mut self) {
        self.set_status(Status::Fetching, hint::FETCHING);
        self.button_enabled = false;
    }

    pub fn resolve_station(&mut self, result: Result<StationInfo, StationError>) {
        match result {
            Ok(info) => {
                info!("stream_url: {}", info.stream_url);
                self.stream_url = Some(info.stream_url);
                self.station_name = info.name;
                self.set_status(Status::Ready, hint::READY);
                self.button_enabled = true;
            }
            Err(e) => {
                error!("station info fetch failed: {}", e);
                self.set_status(Status::Error, hint::FETCH_FAILED);
                self.button_enabled = false;
            }
        }
    }

    /// Fetch the station info and enable the toggle on success.
    pub async fn initialize<S: StationSource>(&mut self, source: &S) {
        self.begin_fetch();
        let result = source.fetch().await;
        self.resolve_station(result);
    }

    // ── media events ────────────────────────────────────────────────────────

    pub fn on_media_event(&mut self, event: MediaEvent) {
        debug!("media event: {:?}", event);
        match event {
            MediaEvent::Playing => {
                self.button_playing = true;
                self.set_status(Status::Playing, "");
            }
            MediaEvent::Pause => {
                // also fires on end-of-stream; Ended handles that case
                if self.media.ended() || !self.media.paused() {
                    return;
                }
                self.button_playing = false;
                self.set_status(Status::Paused, "");
            }
            MediaEvent::Waiting => {
                if !self.media.paused() {
                    self.set_status(Status::Buffering, hint::WAITING);
                }
            }
            MediaEvent::Stalled => {
                if !self.media.paused() {
                    self.set_status(Status::Buffering, hint::STALLED);
                }
            }
            MediaEvent::Ended => {
                self.button_playing = false;
                self.set_status(Status::Ended, "");
            }
            MediaEvent::Error(detail) => {
                error!("audio error: {}", detail);
                self.button_playing = false;
                self.loading = false;
                self.set_status(Status::Error, hint::MEDIA_ERROR);
            }
        }
    }

    // ── toggle ──────────────────────────────────────────────────────────────

    /// Handle a press of the play/pause button.
    ///
    /// Returns the pending playback start when the press begins a connection
    /// attempt. The caller awaits it and hands the result to [`settle`].
    ///
    /// [`settle`]: Controller::settle
    pub fn click(
        &mut self,
    ) -> Option<impl Future<Output = Result<(), MediaError>> + Send + 'static> {
        if !self.button_enabled || self.loading {
            debug!("toggle ignored (enabled={}, loading={})", self.button_enabled, self.loading);
            return None;
        }

        if !self.media.paused() {
            self.stop_playback();
            return None;
        }

        let Some(url) = self.stream_url.clone() else {
            warn!("toggle pressed without a stream url");
            self.set_status(Status::Error, hint::NO_STREAM_URL);
            return None;
        };

        self.loading = true;
        self.set_status(Status::Connecting, hint::CONNECTING);

        if self.media.src().as_deref() != Some(url.as_str()) {
            info!("attaching source {}", url);
            self.media.set_src(&url);
        }

        let media = Arc::clone(&self.media);
        Some(async move { media.play().await })
    }

    /// Apply the outcome of a playback start returned by [`click`].
    ///
    /// [`click`]: Controller::click
    pub fn settle(&mut self, result: Result<(), MediaError>) {
        match result {
            Ok(()) => {
                self.button_playing = true;
                self.set_status(Status::Playing, "");
            }
            Err(e) => {
                error!("playback start failed: {}", e);
                self.button_playing = false;
                self.set_status(Status::Error, hint::PLAY_FAILED);
            }
        }
        self.loading = false;
    }

    /// Press the button and wait for any connection attempt it starts.
    pub async fn toggle(&mut self) {
        if let Some(attempt) = self.click() {
            let result = attempt.await;
            self.settle(result);
        }
    }

    fn stop_playback(&mut self) {
        self.media.pause();
        self.button_playing = false;
        self.set_status(Status::Paused, "");
    }

    // ── volume ──────────────────────────────────────────────────────────────

    pub fn set_volume(&mut self, volume: f32) {
        self.media.set_volume(volume.clamp(0.0, 1.0));
    }
}
