//! Media backend seam.
//!
//! The transport state machine owns exactly one backend and is the only
//! component allowed to mutate its play position or play/pause state. The
//! trait allows swapping implementations (real rodio output vs mock).

use crate::error::{LisnError, Result};
use std::sync::{Arc, Mutex, MutexGuard};

/// One playable media resource.
///
/// Playback is single-threaded and event-driven; implementations are polled
/// from the owning task and need not be thread-safe.
pub trait MediaBackend {
    /// Attach a resource. `source` is whatever the platform layer hands the
    /// transport; for the rodio backend, a local file path.
    fn load(&mut self, source: &str) -> Result<()>;

    /// Detach the current resource, if any.
    fn unload(&mut self);

    /// Begin or resume playback. May fail (no output device, platform
    /// policy); the transport reports the failure without flipping its
    /// play state.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Move the playhead. The transport clamps before calling.
    fn seek(&mut self, seconds: f64) -> Result<()>;

    /// Current playhead in seconds.
    fn position(&self) -> f64;

    /// Total length in seconds, once metadata is available.
    fn duration(&self) -> Option<f64>;

    /// True once the resource played to its end.
    fn is_ended(&self) -> bool;
}

#[derive(Debug, Default)]
struct MockMediaState {
    source: Option<String>,
    playing: bool,
    position: f64,
    duration: Option<f64>,
    metadata_on_load: Option<f64>,
    ended: bool,
    fail_play: bool,
    fail_seek: bool,
    seeks: Vec<f64>,
    play_attempts: usize,
}

/// Mock backend for testing the transport.
///
/// Clones share state, so a test can keep a handle while the transport owns
/// the boxed copy.
#[derive(Debug, Clone, Default)]
pub struct MockMediaBackend {
    state: Arc<Mutex<MockMediaState>>,
}

impl MockMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make metadata (duration) available immediately on load.
    pub fn with_duration(self, seconds: f64) -> Self {
        self.lock().metadata_on_load = Some(seconds);
        self
    }

    /// Make `play` fail, simulating a blocked or missing output device.
    pub fn with_play_failure(self) -> Self {
        self.lock().fail_play = true;
        self
    }

    /// Make `seek` fail at the media layer.
    pub fn with_seek_failure(self) -> Self {
        self.lock().fail_seek = true;
        self
    }

    /// Deliver metadata after load, like a resource whose headers arrive
    /// late.
    pub fn reveal_duration(&self, seconds: f64) {
        self.lock().duration = Some(seconds);
    }

    /// Simulate playback time passing.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.lock();
        if state.playing {
            state.position += seconds;
        }
    }

    /// Simulate the resource reaching its end.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.ended = true;
        state.playing = false;
        if let Some(duration) = state.duration {
            state.position = duration;
        }
    }

    /// Every position handed to `seek`, in call order.
    pub fn seek_log(&self) -> Vec<f64> {
        self.lock().seeks.clone()
    }

    pub fn play_attempts(&self) -> usize {
        self.lock().play_attempts
    }

    pub fn loaded_source(&self) -> Option<String> {
        self.lock().source.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn lock(&self) -> MutexGuard<'_, MockMediaState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediaBackend for MockMediaBackend {
    fn load(&mut self, source: &str) -> Result<()> {
        let mut state = self.lock();
        state.source = Some(source.to_string());
        state.position = 0.0;
        state.ended = false;
        state.playing = false;
        state.duration = state.metadata_on_load;
        Ok(())
    }

    fn unload(&mut self) {
        let mut state = self.lock();
        state.source = None;
        state.playing = false;
        state.position = 0.0;
        state.duration = None;
        state.ended = false;
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.play_attempts += 1;
        if state.fail_play {
            return Err(LisnError::Playback {
                message: "output device unavailable".to_string(),
            });
        }
        state.playing = true;
        state.ended = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.lock().playing = false;
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let mut state = self.lock();
        state.seeks.push(seconds);
        if state.fail_seek {
            return Err(LisnError::Playback {
                message: "seek not supported".to_string(),
            });
        }
        state.position = seconds;
        state.ended = false;
        Ok(())
    }

    fn position(&self) -> f64 {
        self.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn is_ended(&self) -> bool {
        self.lock().ended
    }
}

/// Audio output through rodio.
///
/// Expects `source` to be a local file path; the app layer downloads the
/// resource first.
#[cfg(feature = "playback")]
pub struct RodioBackend {
    // Held for its lifetime; dropping it kills the output stream.
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<rodio::Sink>,
    duration: Option<f64>,
}

#[cfg(feature = "playback")]
impl RodioBackend {
    /// Open the default audio output device.
    pub fn new() -> Result<Self> {
        let (stream, handle) = rodio::OutputStream::try_default().map_err(|e| {
            LisnError::Playback {
                message: format!("no audio output device: {e}"),
            }
        })?;
        Ok(Self {
            _stream: stream,
            handle,
            sink: None,
            duration: None,
        })
    }
}

#[cfg(feature = "playback")]
impl MediaBackend for RodioBackend {
    fn load(&mut self, source: &str) -> Result<()> {
        use rodio::Source;

        let file = std::fs::File::open(source)?;
        let decoder = rodio::Decoder::new(std::io::BufReader::new(file)).map_err(|e| {
            LisnError::Playback {
                message: format!("cannot decode audio: {e}"),
            }
        })?;
        self.duration = decoder.total_duration().map(|d| d.as_secs_f64());

        let sink = rodio::Sink::try_new(&self.handle).map_err(|e| LisnError::Playback {
            message: format!("cannot open audio sink: {e}"),
        })?;
        sink.pause();
        sink.append(decoder);
        self.sink = Some(sink);
        Ok(())
    }

    fn unload(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.duration = None;
    }

    fn play(&mut self) -> Result<()> {
        let sink = self.sink.as_ref().ok_or_else(|| LisnError::Playback {
            message: "no resource loaded".to_string(),
        })?;
        sink.play();
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        Ok(())
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let sink = self.sink.as_ref().ok_or_else(|| LisnError::Playback {
            message: "no resource loaded".to_string(),
        })?;
        sink.try_seek(std::time::Duration::from_secs_f64(seconds.max(0.0)))
            .map_err(|e| LisnError::Playback {
                message: format!("seek failed: {e}"),
            })
    }

    fn position(&self) -> f64 {
        self.sink
            .as_ref()
            .map(|sink| sink.get_pos().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_ended(&self) -> bool {
        self.sink.as_ref().map(|sink| sink.empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_load_resets_position_and_end_flag() {
        let mut backend = MockMediaBackend::new().with_duration(95.0);
        backend.load("file.mp3").unwrap();

        assert_eq!(backend.loaded_source().as_deref(), Some("file.mp3"));
        assert_eq!(backend.position(), 0.0);
        assert_eq!(backend.duration(), Some(95.0));
        assert!(!backend.is_ended());
    }

    #[test]
    fn test_mock_metadata_can_arrive_late() {
        let mut backend = MockMediaBackend::new();
        backend.load("file.mp3").unwrap();
        assert_eq!(backend.duration(), None);

        backend.reveal_duration(42.0);
        assert_eq!(backend.duration(), Some(42.0));
    }

    #[test]
    fn test_mock_play_failure_leaves_paused() {
        let mut backend = MockMediaBackend::new().with_play_failure();
        backend.load("file.mp3").unwrap();

        assert!(backend.play().is_err());
        assert!(!backend.is_playing());
        assert_eq!(backend.play_attempts(), 1);
    }

    #[test]
    fn test_mock_advance_only_moves_while_playing() {
        let mut backend = MockMediaBackend::new().with_duration(60.0);
        backend.load("file.mp3").unwrap();

        backend.advance(5.0);
        assert_eq!(backend.position(), 0.0);

        backend.play().unwrap();
        backend.advance(5.0);
        assert_eq!(backend.position(), 5.0);
    }

    #[test]
    fn test_mock_records_seeks() {
        let mut backend = MockMediaBackend::new().with_duration(60.0);
        backend.load("file.mp3").unwrap();
        backend.seek(10.0).unwrap();
        backend.seek(30.0).unwrap();
        assert_eq!(backend.seek_log(), vec![10.0, 30.0]);
        assert_eq!(backend.position(), 30.0);
    }

    #[test]
    fn test_mock_finish_marks_ended() {
        let mut backend = MockMediaBackend::new().with_duration(60.0);
        backend.load("file.mp3").unwrap();
        backend.play().unwrap();
        backend.finish();

        assert!(backend.is_ended());
        assert!(!backend.is_playing());
        assert_eq!(backend.position(), 60.0);
    }

    #[test]
    fn test_mock_clones_share_state() {
        let handle = MockMediaBackend::new().with_duration(60.0);
        let mut owned = handle.clone();
        owned.load("file.mp3").unwrap();

        assert_eq!(handle.loaded_source().as_deref(), Some("file.mp3"));
    }
}
