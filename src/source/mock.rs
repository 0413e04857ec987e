//! Mock capture source for testing without hardware.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{BlockCallback, CaptureErrorCallback, CaptureSource};
use crate::format::encode_samples;
use crate::stream_thread::in_audio_callback;
use crate::{AudioFormat, RouterError, SampleFormat};

#[derive(Default)]
struct MockState {
    on_block: Option<BlockCallback>,
    on_error: Option<CaptureErrorCallback>,
    started: bool,
    /// Bumped on every start/stop so a callback taken out for delivery is
    /// only put back into the session it came from.
    generation: u64,
    late_delivery: bool,
    open_count: usize,
    stop_count: usize,
}

/// A capture source driven by the test through a [`MockCaptureHandle`].
///
/// Blocks pushed through the handle are delivered synchronously on the
/// calling thread, as if the loopback callback had fired.
///
/// # Example
///
/// ```
/// use audio_fanout::source::{CaptureSource, MockCapture};
/// use audio_fanout::{AudioFormat, SampleFormat};
///
/// let format = AudioFormat::new(48000, 2, SampleFormat::F32);
/// let (mut capture, handle) = MockCapture::new(format);
///
/// assert_eq!(capture.open().unwrap(), format);
/// capture
///     .start(
///         Box::new(|block: &[u8]| assert_eq!(block.len(), 8)),
///         Box::new(|_: String| {}),
///     )
///     .unwrap();
/// assert!(handle.push_block(&[0u8; 8]));
/// ```
pub struct MockCapture {
    format: AudioFormat,
    open_error: Option<RouterError>,
    state: Arc<Mutex<MockState>>,
}

impl MockCapture {
    /// Creates a mock capture source and the handle that drives it.
    pub fn new(format: AudioFormat) -> (Self, MockCaptureHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let capture = Self {
            format,
            open_error: None,
            state: state.clone(),
        };
        let handle = MockCaptureHandle { format, state };
        (capture, handle)
    }

    /// Creates a 48 kHz stereo float source, the common WASAPI mix format.
    pub fn stereo_f32() -> (Self, MockCaptureHandle) {
        Self::new(AudioFormat::new(48000, 2, SampleFormat::F32))
    }

    /// Makes `open()` fail with `error`.
    #[must_use]
    pub fn with_open_error(mut self, error: RouterError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Keeps the block callback reachable after `stop()`.
    ///
    /// Simulates a callback already in flight when the router stops.
    #[must_use]
    pub fn with_late_delivery(self) -> Self {
        self.state.lock().late_delivery = true;
        self
    }
}

impl CaptureSource for MockCapture {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&mut self) -> Result<AudioFormat, RouterError> {
        self.state.lock().open_count += 1;
        match &self.open_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.format),
        }
    }

    fn start(
        &mut self,
        on_block: BlockCallback,
        on_error: CaptureErrorCallback,
    ) -> Result<(), RouterError> {
        let mut state = self.state.lock();
        state.on_block = Some(on_block);
        state.on_error = Some(on_error);
        state.started = true;
        state.generation += 1;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.stop_count += 1;
        state.started = false;
        state.on_error = None;
        if !state.late_delivery {
            state.on_block = None;
            state.generation += 1;
        }
    }
}

/// Test-side handle for a [`MockCapture`]. Cheap to clone.
#[derive(Clone)]
pub struct MockCaptureHandle {
    format: AudioFormat,
    state: Arc<Mutex<MockState>>,
}

impl MockCaptureHandle {
    /// Delivers one block to the registered callback.
    ///
    /// Returns `false` if no callback was reachable.
    pub fn push_block(&self, block: &[u8]) -> bool {
        let (callback, generation) = {
            let mut state = self.state.lock();
            if !state.started && !state.late_delivery {
                return false;
            }
            (state.on_block.take(), state.generation)
        };
        let Some(mut callback) = callback else {
            return false;
        };

        // The lock is released so the callback may stop the router
        in_audio_callback(|| callback(block));

        let mut state = self.state.lock();
        if state.generation == generation && state.on_block.is_none() {
            state.on_block = Some(callback);
        }
        true
    }

    /// Delivers `duration` of silence in the source format.
    pub fn push_silence(&self, duration: Duration) -> bool {
        self.push_block(&vec![0u8; self.format.bytes_for(duration)])
    }

    /// Delivers `duration` of a sine tone in the source format.
    pub fn push_sine(&self, frequency: f64, duration: Duration) -> bool {
        let frames = self.format.bytes_for(duration) / self.format.bytes_per_frame();
        let channels = usize::from(self.format.channels);
        let sample_rate = f64::from(self.format.sample_rate);

        let tone = (0..frames).map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin()
        });

        let mut bytes = Vec::new();
        match self.format.sample_format {
            SampleFormat::I16 => {
                let samples: Vec<i16> = tone
                    .flat_map(|v| std::iter::repeat((v * 32767.0) as i16).take(channels))
                    .collect();
                encode_samples(&samples, &mut bytes);
            }
            SampleFormat::I32 => {
                let samples: Vec<i32> = tone
                    .flat_map(|v| std::iter::repeat((v * 2_147_483_647.0) as i32).take(channels))
                    .collect();
                encode_samples(&samples, &mut bytes);
            }
            SampleFormat::F32 => {
                let samples: Vec<f32> = tone
                    .flat_map(|v| std::iter::repeat(v as f32).take(channels))
                    .collect();
                encode_samples(&samples, &mut bytes);
            }
        }
        self.push_block(&bytes)
    }

    /// Reports a fatal capture error, as if the endpoint disappeared.
    pub fn fail(&self, cause: &str) {
        let callback = self.state.lock().on_error.take();
        if let Some(mut callback) = callback {
            in_audio_callback(|| callback(cause.to_string()));
        }
    }

    /// Whether the source is currently started.
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// How many times `open()` was called.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// How many times `stop()` was called.
    pub fn stop_count(&self) -> usize {
        self.state.lock().stop_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (BlockCallback, Arc<AtomicUsize>) {
        let bytes = Arc::new(AtomicUsize::new(0));
        let counter = bytes.clone();
        let callback: BlockCallback = Box::new(move |block: &[u8]| {
            counter.fetch_add(block.len(), Ordering::SeqCst);
        });
        (callback, bytes)
    }

    #[test]
    fn test_push_before_start_is_ignored() {
        let (_capture, handle) = MockCapture::stereo_f32();
        assert!(!handle.push_block(&[0u8; 8]));
    }

    #[test]
    fn test_push_delivers_after_start() {
        let (mut capture, handle) = MockCapture::stereo_f32();
        let (callback, bytes) = counting();
        capture.open().unwrap();
        capture.start(callback, Box::new(|_: String| {})).unwrap();

        assert!(handle.push_block(&[0u8; 64]));
        assert!(handle.push_block(&[0u8; 64]));
        assert_eq!(bytes.load(Ordering::SeqCst), 128);
    }

    #[test]
    fn test_stop_disconnects_callback() {
        let (mut capture, handle) = MockCapture::stereo_f32();
        let (callback, bytes) = counting();
        capture.start(callback, Box::new(|_: String| {})).unwrap();
        capture.stop();

        assert!(!handle.push_block(&[0u8; 64]));
        assert_eq!(bytes.load(Ordering::SeqCst), 0);
        assert_eq!(handle.stop_count(), 1);
    }

    #[test]
    fn test_late_delivery_after_stop() {
        let (capture, handle) = MockCapture::stereo_f32();
        let mut capture = capture.with_late_delivery();
        let (callback, bytes) = counting();
        capture.start(callback, Box::new(|_: String| {})).unwrap();
        capture.stop();

        assert!(handle.push_block(&[0u8; 16]));
        assert_eq!(bytes.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_open_error() {
        let (capture, handle) = MockCapture::stereo_f32();
        let mut capture =
            capture.with_open_error(RouterError::device_unavailable("no render endpoint"));

        assert!(matches!(
            capture.open(),
            Err(RouterError::DeviceUnavailable { .. })
        ));
        assert_eq!(handle.open_count(), 1);
    }

    #[test]
    fn test_sine_block_size() {
        let (mut capture, handle) = MockCapture::new(AudioFormat::new(1000, 2, SampleFormat::I16));
        let (callback, bytes) = counting();
        capture.start(callback, Box::new(|_: String| {})).unwrap();

        handle.push_sine(100.0, Duration::from_millis(100));
        // 100 frames * 2 channels * 2 bytes
        assert_eq!(bytes.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn test_fail_invokes_error_callback_once() {
        let (mut capture, handle) = MockCapture::stereo_f32();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        capture
            .start(
                Box::new(|_: &[u8]| {}),
                Box::new(move |_: String| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        handle.fail("endpoint removed");
        handle.fail("endpoint removed");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
