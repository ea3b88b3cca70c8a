use crate::config::PlayerConfig;
use crate::media::{MediaElement, MediaError, MediaEvent};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::VecDeque;
use std::io::{BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, info, warn};

const CHANNELS: u16 = 2;
const SAMPLE_RATE: u32 = 44100;
const RECV_TICK: Duration = Duration::from_millis(100);
/// Underrun ticks before `Waiting` escalates to `Stalled`.
const STALL_TICKS: u32 = 30;

/// ffmpeg decoding into a rodio sink, behaving like a media element.
pub struct RodioMedia {
    inner: Mutex<Inner>,
    events: UnboundedSender<MediaEvent>,
    ffmpeg: String,
    start_timeout: Duration,
}

struct Inner {
    src: Option<String>,
    volume: f32,
    output: Option<OutputStreamHandle>,
    pipeline: Option<Pipeline>,
}

/// Flags shared between the media element, the reader thread and the source.
#[derive(Default)]
struct Flags {
    closed: AtomicBool,
    ended: AtomicBool,
    failed: AtomicBool,
}

struct Pipeline {
    child: Arc<Mutex<Option<Child>>>,
    sink: Sink,
    flags: Arc<Flags>,
}

impl Pipeline {
    fn usable(&self) -> bool {
        !self.flags.ended.load(Ordering::SeqCst) && !self.flags.failed.load(Ordering::SeqCst)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.flags.closed.store(true, Ordering::SeqCst);
        self.sink.stop();

        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut c) = guard.take() {
                let _ = c.kill();
                let _ = c.wait();
            }
        }
    }
}

fn emit(events: &UnboundedSender<MediaEvent>, flags: &Flags, event: MediaEvent) {
    if !flags.closed.load(Ordering::SeqCst) {
        let _ = events.send(event);
    }
}

impl RodioMedia {
    pub fn new(events: UnboundedSender<MediaEvent>, config: &PlayerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                src: None,
                volume: config.initial_volume.clamp(0.0, 1.0),
                output: None,
                pipeline: None,
            }),
            events,
            ffmpeg: config.ffmpeg.clone(),
            start_timeout: Duration::from_secs(config.start_timeout_secs),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resume an already running pipeline. Returns false if a new one is needed.
    fn resume(&self) -> bool {
        let inner = self.lock();
        match inner.pipeline.as_ref() {
            Some(p) if p.usable() => {
                p.sink.play();
                emit(&self.events, &p.flags, MediaEvent::Playing);
                true
            }
            _ => false,
        }
    }

    async fn output(&self) -> Result<OutputStreamHandle, MediaError> {
        let cached = self.lock().output.clone();
        if let Some(handle) = cached {
            return Ok(handle);
        }

        let handle = tokio::task::spawn_blocking(open_output)
            .await
            .map_err(|e| MediaError::Output(e.to_string()))??;
        self.lock().output = Some(handle.clone());
        Ok(handle)
    }

    fn start_pipeline(
        &self,
        handle: &OutputStreamHandle,
        url: &str,
    ) -> Result<oneshot::Receiver<()>, MediaError> {
        let mut inner = self.lock();
        // drop the previous pipeline before spawning another ffmpeg
        inner.pipeline = None;

        let sink = Sink::try_new(handle)
            .map_err(|e| MediaError::Output(format!("failed to create audio sink: {}", e)))?;
        sink.set_volume(inner.volume);

        info!("spawning {} for {}", self.ffmpeg, url);
        let mut child = Command::new(&self.ffmpeg)
            .arg("-reconnect")
            .arg("1")
            .arg("-reconnect_streamed")
            .arg("1")
            .arg("-reconnect_delay_max")
            .arg("5")
            .arg("-i")
            .arg(url)
            .arg("-f")
            .arg("s16le")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg(CHANNELS.to_string())
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MediaError::Spawn(format!("{}: {}", self.ffmpeg, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Spawn("failed to capture ffmpeg stdout".into()))?;

        let flags = Arc::new(Flags::default());
        let child = Arc::new(Mutex::new(Some(child)));
        let (tx, rx) = mpsc::sync_channel::<Vec<i16>>(10);
        let (first_tx, first_rx) = oneshot::channel();

        let reader = Reader {
            child: Arc::clone(&child),
            flags: Arc::clone(&flags),
            events: self.events.clone(),
        };
        thread::Builder::new()
            .name("ffmpeg-reader".into())
            .spawn(move || reader.run(stdout, tx, first_tx))
            .map_err(|e| MediaError::Spawn(e.to_string()))?;

        sink.append(FfmpegSource::new(
            rx,
            Arc::clone(&flags),
            self.events.clone(),
        ));

        inner.pipeline = Some(Pipeline { child, sink, flags });
        Ok(first_rx)
    }

    /// Kill ffmpeg and silence the sink.
    pub fn stop(&self) {
        self.lock().pipeline = None;
    }
}

fn open_output() -> Result<OutputStreamHandle, MediaError> {
    let (tx, rx) = mpsc::channel();

    // OutputStream is not Send; it lives on its own thread for the whole run.
    thread::Builder::new()
        .name("audio-output".into())
        .spawn(move || match OutputStream::try_default() {
            Ok((_stream, handle)) => {
                if tx.send(Ok(handle)).is_ok() {
                    loop {
                        thread::park();
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(MediaError::Output(format!(
                    "failed to initialize audio output: {}. Check your audio drivers.",
                    e
                ))));
            }
        })
        .map_err(|e| MediaError::Output(e.to_string()))?;

    rx.recv()
        .map_err(|_| MediaError::Output("audio output thread exited".into()))?
}

impl MediaElement for RodioMedia {
    fn src(&self) -> Option<String> {
        self.lock().src.clone()
    }

    fn set_src(&self, url: &str) {
        let mut inner = self.lock();
        if inner.src.as_deref() != Some(url) {
            inner.src = Some(url.to_string());
            inner.pipeline = None;
        }
    }

    async fn play(&self) -> Result<(), MediaError> {
        let url = self.src().ok_or(MediaError::NoSource)?;
        if self.resume() {
            return Ok(());
        }

        let handle = self.output().await?;
        let first_audio = self.start_pipeline(&handle, &url)?;

        match tokio::time::timeout(self.start_timeout, first_audio).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.stop();
                Err(MediaError::StreamClosed)
            }
            Err(_) => {
                self.stop();
                Err(MediaError::StartTimeout(self.start_timeout.as_secs()))
            }
        }
    }

    fn pause(&self) {
        let inner = self.lock();
        if let Some(p) = inner.pipeline.as_ref() {
            p.sink.pause();
            emit(&self.events, &p.flags, MediaEvent::Pause);
        }
    }

    fn paused(&self) -> bool {
        match self.lock().pipeline.as_ref() {
            Some(p) => p.sink.is_paused() || !p.usable(),
            None => true,
        }
    }

    fn ended(&self) -> bool {
        self.lock()
            .pipeline
            .as_ref()
            .map(|p| p.flags.ended.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn set_volume(&self, volume: f32) {
        let mut inner = self.lock();
        inner.volume = volume;
        if let Some(p) = inner.pipeline.as_ref() {
            p.sink.set_volume(volume);
        }
    }
}

/// Pumps ffmpeg's stdout into the sample channel.
struct Reader {
    child: Arc<Mutex<Option<Child>>>,
    flags: Arc<Flags>,
    events: UnboundedSender<MediaEvent>,
}

impl Reader {
    fn run(
        self,
        stdout: impl Read,
        tx: mpsc::SyncSender<Vec<i16>>,
        first_tx: oneshot::Sender<()>,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buf = [0u8; 8192];
        let mut first_tx = Some(first_tx);
        let mut carry: Option<u8> = None;

        let read_error = loop {
            match reader.read(&mut buf) {
                Ok(0) => break None,
                Ok(n) => {
                    let samples = decode_s16le(&mut carry, &buf[..n]);
                    if samples.is_empty() {
                        continue;
                    }
                    if let Some(started) = first_tx.take() {
                        debug!("first audio chunk received");
                        let _ = started.send(());
                        emit(&self.events, &self.flags, MediaEvent::Playing);
                    }
                    if tx.send(samples).is_err() {
                        return;
                    }
                }
                Err(e) => break Some(e.to_string()),
            }
        };

        // never started: the pending play() reports the failure, not the source
        if first_tx.is_some() {
            self.flags.failed.store(true, Ordering::SeqCst);
            return;
        }
        if self.flags.closed.load(Ordering::SeqCst) {
            return;
        }

        let exit = self
            .child
            .lock()
            .ok()
            .and_then(|mut guard| guard.as_mut().and_then(|c| c.wait().ok()));

        let failure = match (read_error, exit) {
            (Some(e), _) => Some(format!("read error: {}", e)),
            (None, Some(status)) if !status.success() => Some(format!("ffmpeg exited: {}", status)),
            _ => None,
        };

        if let Some(detail) = failure {
            warn!("stream failed: {}", detail);
            self.flags.failed.store(true, Ordering::SeqCst);
            emit(&self.events, &self.flags, MediaEvent::Error(detail));
        } else {
            info!("stream closed by server");
        }
        drop(tx);
    }
}

/// Little-endian i16 pairs; an odd trailing byte is carried to the next read.
fn decode_s16le(carry: &mut Option<u8>, bytes: &[u8]) -> Vec<i16> {
    let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
    let mut rest = bytes;

    if let Some(lo) = carry.take() {
        match rest.split_first() {
            Some((&hi, tail)) => {
                samples.push(i16::from_le_bytes([lo, hi]));
                rest = tail;
            }
            None => {
                *carry = Some(lo);
                return samples;
            }
        }
    }

    let mut pairs = rest.chunks_exact(2);
    for pair in pairs.by_ref() {
        samples.push(i16::from_le_bytes([pair[0], pair[1]]));
    }
    *carry = pairs.remainder().first().copied();
    samples
}

struct FfmpegSource {
    rx: mpsc::Receiver<Vec<i16>>,
    buffer: VecDeque<i16>,
    flags: Arc<Flags>,
    events: UnboundedSender<MediaEvent>,
    underrun_ticks: u32,
}

impl FfmpegSource {
    fn new(
        rx: mpsc::Receiver<Vec<i16>>,
        flags: Arc<Flags>,
        events: UnboundedSender<MediaEvent>,
    ) -> Self {
        FfmpegSource {
            rx,
            buffer: VecDeque::with_capacity(8192),
            flags,
            events,
            underrun_ticks: 0,
        }
    }

    fn refill(&mut self, chunk: Vec<i16>) {
        if self.underrun_ticks > 0 {
            self.underrun_ticks = 0;
            emit(&self.events, &self.flags, MediaEvent::Playing);
        }
        self.buffer.extend(chunk);
    }

    fn finish(&mut self) -> Option<f32> {
        if !self.flags.failed.load(Ordering::SeqCst) && !self.flags.ended.swap(true, Ordering::SeqCst)
        {
            emit(&self.events, &self.flags, MediaEvent::Ended);
        }
        None
    }
}

impl Iterator for FfmpegSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(s) = self.buffer.pop_front() {
                return Some(s as f32 / 32768.0);
            }

            if self.flags.closed.load(Ordering::SeqCst) {
                return None;
            }

            match self.rx.recv_timeout(RECV_TICK) {
                Ok(chunk) => self.refill(chunk),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    self.underrun_ticks += 1;
                    if self.underrun_ticks == 1 {
                        emit(&self.events, &self.flags, MediaEvent::Waiting);
                    } else if self.underrun_ticks == STALL_TICKS {
                        emit(&self.events, &self.flags, MediaEvent::Stalled);
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return self.finish(),
            }
        }
    }
}

impl Source for FfmpegSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }
    fn channels(&self) -> u16 {
        CHANNELS
    }
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
    fn total_duration(&self) -> Option<Duration> {
        None // live stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn source() -> (
        mpsc::SyncSender<Vec<i16>>,
        FfmpegSource,
        tokio::sync::mpsc::UnboundedReceiver<MediaEvent>,
    ) {
        let (tx, rx) = mpsc::sync_channel(10);
        let (events_tx, events_rx) = unbounded_channel();
        let src = FfmpegSource::new(rx, Arc::new(Flags::default()), events_tx);
        (tx, src, events_rx)
    }

    #[test]
    fn decodes_little_endian_samples_across_reads() {
        let mut carry = None;
        assert_eq!(decode_s16le(&mut carry, &[0x01, 0x00, 0xff]), vec![1]);
        assert_eq!(carry, Some(0xff));
        assert_eq!(decode_s16le(&mut carry, &[0x7f, 0x00, 0x80]), vec![0x7fff, i16::MIN]);
        assert_eq!(carry, None);
        assert!(decode_s16le(&mut carry, &[]).is_empty());
    }

    #[test]
    fn source_reports_underrun_then_recovery() {
        let (tx, mut src, mut events) = source();

        let feeder = thread::spawn(move || {
            thread::sleep(Duration::from_millis(250));
            tx.send(vec![16384, -16384]).unwrap();
        });

        assert_eq!(src.next(), Some(0.5));
        assert_eq!(src.next(), Some(-0.5));
        feeder.join().unwrap();

        assert_eq!(events.try_recv().ok(), Some(MediaEvent::Waiting));
        assert_eq!(events.try_recv().ok(), Some(MediaEvent::Playing));
    }

    #[test]
    fn clean_close_ends_once() {
        let (tx, mut src, mut events) = source();
        tx.send(vec![0]).unwrap();
        drop(tx);

        assert_eq!(src.next(), Some(0.0));
        assert_eq!(src.next(), None);
        assert_eq!(src.next(), None);
        assert!(src.flags.ended.load(Ordering::SeqCst));
        assert_eq!(events.try_recv().ok(), Some(MediaEvent::Ended));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn failed_stream_does_not_report_ended() {
        let (tx, mut src, mut events) = source();
        src.flags.failed.store(true, Ordering::SeqCst);
        drop(tx);

        assert_eq!(src.next(), None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn closed_pipeline_is_silent() {
        let (tx, mut src, mut events) = source();
        src.flags.closed.store(true, Ordering::SeqCst);

        assert_eq!(src.next(), None);
        drop(tx);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn stream_that_never_starts_is_not_reported_as_ended() {
        let (tx, mut src, mut events) = source();
        let (first_tx, mut first_rx) = oneshot::channel();
        let reader = Reader {
            child: Arc::new(Mutex::new(None)),
            flags: Arc::clone(&src.flags),
            events: src.events.clone(),
        };

        reader.run(std::io::empty(), tx, first_tx);

        assert_eq!(src.next(), None);
        assert!(src.flags.failed.load(Ordering::SeqCst));
        assert!(!src.flags.ended.load(Ordering::SeqCst));
        assert!(events.try_recv().is_err());
        // the pending play() sees the sender dropped
        assert!(first_rx.try_recv().is_err());
    }

    fn media_with_idle_pipeline() -> (
        RodioMedia,
        Arc<Flags>,
        tokio::sync::mpsc::UnboundedReceiver<MediaEvent>,
    ) {
        let (events_tx, events_rx) = unbounded_channel();
        let media = RodioMedia::new(events_tx, &PlayerConfig::default());
        let (sink, _queue) = Sink::new_idle();
        let flags = Arc::new(Flags::default());
        media.lock().pipeline = Some(Pipeline {
            child: Arc::new(Mutex::new(None)),
            sink,
            flags: Arc::clone(&flags),
        });
        (media, flags, events_rx)
    }

    #[test]
    fn running_pipeline_pauses_and_resumes() {
        let (media, _flags, mut events) = media_with_idle_pipeline();
        assert!(!media.paused());
        assert!(!media.ended());

        media.pause();
        assert!(media.paused());
        assert_eq!(events.try_recv().ok(), Some(MediaEvent::Pause));

        assert!(media.resume());
        assert!(!media.paused());
        assert_eq!(events.try_recv().ok(), Some(MediaEvent::Playing));
    }

    #[test]
    fn ended_pipeline_restarts_instead_of_resuming() {
        let (media, flags, mut events) = media_with_idle_pipeline();
        flags.ended.store(true, Ordering::SeqCst);

        assert!(media.paused());
        assert!(media.ended());
        assert!(!media.resume());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn failed_pipeline_restarts_instead_of_resuming() {
        let (media, flags, mut events) = media_with_idle_pipeline();
        flags.failed.store(true, Ordering::SeqCst);

        assert!(media.paused());
        assert!(!media.ended());
        assert!(!media.resume());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn stop_drops_pipeline_and_silences_events() {
        let (media, flags, mut events) = media_with_idle_pipeline();
        media.stop();

        assert!(flags.closed.load(Ordering::SeqCst));
        assert!(media.paused());
        media.pause();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn media_without_pipeline_reads_as_paused() {
        let (events_tx, _events_rx) = unbounded_channel();
        let media = RodioMedia::new(events_tx, &PlayerConfig::default());

        assert!(media.paused());
        assert!(!media.ended());
        assert!(media.src().is_none());

        media.set_src("https://x/stream.mp3");
        media.set_volume(0.3);
        assert_eq!(media.src().as_deref(), Some("https://x/stream.mp3"));
        assert_eq!(media.volume(), 0.3);
    }

    #[tokio::test]
    async fn play_without_source_fails() {
        let (events_tx, _events_rx) = unbounded_channel();
        let media = RodioMedia::new(events_tx, &PlayerConfig::default());
        assert!(matches!(media.play().await, Err(MediaError::NoSource)));
    }
}
