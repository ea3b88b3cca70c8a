use std::future::Future;
use thiserror::Error;

/// Lifecycle notifications emitted by a media element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaEvent {
    Playing,
    Pause,
    Waiting,
    Stalled,
    Ended,
    Error(String),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no source assigned")]
    NoSource,
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("failed to spawn decoder: {0}")]
    Spawn(String),
    #[error("stream closed before any audio arrived")]
    StreamClosed,
    #[error("no audio within {0}s")]
    StartTimeout(u64),
}

/// A playback element bound to a single network source.
///
/// `play` settles once audio is actually flowing (or fails). Everything else
/// is synchronous. Implementations push `MediaEvent`s to whoever they were
/// built with; the trait itself does not expose the event channel.
pub trait MediaElement: Send + Sync + 'static {
    fn src(&self) -> Option<String>;
    fn set_src(&self, url: &str);
    fn play(&self) -> impl Future<Output = Result<(), MediaError>> + Send;
    fn pause(&self);
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
}
