//! In-memory playback devices for testing without hardware.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{PlaybackBackend, PlaybackErrorCallback, PlaybackStream};
use crate::{AudioFormat, DeviceId, RouterError, SinkReader};

struct MockDevice {
    reader: Option<SinkReader>,
    on_error: Option<PlaybackErrorCallback>,
    format: AudioFormat,
    playing: bool,
}

#[derive(Default)]
struct MockState {
    open_failures: HashMap<DeviceId, String>,
    play_failures: HashMap<DeviceId, String>,
    stop_failures: HashMap<DeviceId, String>,
    devices: HashMap<DeviceId, MockDevice>,
    open_order: Vec<DeviceId>,
}

/// A playback backend whose devices are plain buffers.
///
/// Nothing drains the sink buffers on its own; tests pull audio with
/// [`read()`](Self::read) to play the role of the hardware clock. Clones
/// share the same devices.
///
/// # Example
///
/// ```
/// use audio_fanout::sink::MockPlayback;
///
/// let playback = MockPlayback::new().fail_open("B", "device in use");
/// assert!(playback.available("A").is_none());
/// ```
#[derive(Clone, Default)]
pub struct MockPlayback {
    state: Arc<Mutex<MockState>>,
}

impl MockPlayback {
    /// Creates a backend where every device opens successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes opening `device_id` fail with `cause`.
    #[must_use]
    pub fn fail_open(self, device_id: impl Into<DeviceId>, cause: &str) -> Self {
        self.state
            .lock()
            .open_failures
            .insert(device_id.into(), cause.to_string());
        self
    }

    /// Makes starting `device_id` fail with `cause` after it opened.
    #[must_use]
    pub fn fail_play(self, device_id: impl Into<DeviceId>, cause: &str) -> Self {
        self.state
            .lock()
            .play_failures
            .insert(device_id.into(), cause.to_string());
        self
    }

    /// Makes stopping `device_id` report `cause`.
    #[must_use]
    pub fn fail_stop(self, device_id: impl Into<DeviceId>, cause: &str) -> Self {
        self.state
            .lock()
            .stop_failures
            .insert(device_id.into(), cause.to_string());
        self
    }

    /// Pulls up to `max_bytes` from the device's sink buffer.
    ///
    /// Returns an empty vector for unknown or stopped devices.
    pub fn read(&self, device_id: impl Into<DeviceId>, max_bytes: usize) -> Vec<u8> {
        let id = device_id.into();
        let mut state = self.state.lock();
        state
            .devices
            .get_mut(&id)
            .and_then(|d| d.reader.as_mut())
            .map(|r| r.read_vec(max_bytes))
            .unwrap_or_default()
    }

    /// Bytes waiting in the device's sink buffer, or `None` if the device
    /// has no open sink.
    pub fn available(&self, device_id: impl Into<DeviceId>) -> Option<usize> {
        let id = device_id.into();
        let state = self.state.lock();
        state
            .devices
            .get(&id)
            .and_then(|d| d.reader.as_ref())
            .map(SinkReader::available)
    }

    /// Whether the device is open and playing.
    pub fn is_playing(&self, device_id: impl Into<DeviceId>) -> bool {
        let id = device_id.into();
        self.state
            .lock()
            .devices
            .get(&id)
            .is_some_and(|d| d.playing)
    }

    /// Format the device was opened with.
    pub fn format_of(&self, device_id: impl Into<DeviceId>) -> Option<AudioFormat> {
        let id = device_id.into();
        self.state.lock().devices.get(&id).map(|d| d.format)
    }

    /// Every device that was opened, in order, including reopened ones.
    pub fn opened(&self) -> Vec<DeviceId> {
        self.state.lock().open_order.clone()
    }

    /// Reports a fatal error on a playing device, as if it were unplugged.
    ///
    /// The callback runs on the calling thread with the backend unlocked.
    pub fn disconnect(&self, device_id: impl Into<DeviceId>, cause: &str) {
        let id = device_id.into();
        let callback = self
            .state
            .lock()
            .devices
            .get_mut(&id)
            .and_then(|d| d.on_error.take());
        if let Some(mut callback) = callback {
            crate::stream_thread::in_audio_callback(|| callback(cause.to_string()));
        }
    }
}

impl PlaybackBackend for MockPlayback {
    fn open(
        &self,
        device_id: &DeviceId,
        format: &AudioFormat,
        reader: SinkReader,
        on_error: PlaybackErrorCallback,
    ) -> Result<Box<dyn PlaybackStream>, RouterError> {
        let mut state = self.state.lock();
        if let Some(cause) = state.open_failures.get(device_id) {
            return Err(RouterError::device_init_failed(device_id, cause));
        }

        state.open_order.push(device_id.clone());
        state.devices.insert(
            device_id.clone(),
            MockDevice {
                reader: Some(reader),
                on_error: Some(on_error),
                format: *format,
                playing: false,
            },
        );

        Ok(Box::new(MockStream {
            device_id: device_id.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockStream {
    device_id: DeviceId,
    state: Arc<Mutex<MockState>>,
}

impl PlaybackStream for MockStream {
    fn play(&mut self) -> Result<(), RouterError> {
        let mut state = self.state.lock();
        if let Some(cause) = state.play_failures.get(&self.device_id) {
            return Err(RouterError::device_init_failed(&self.device_id, cause));
        }
        if let Some(device) = state.devices.get_mut(&self.device_id) {
            device.playing = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RouterError> {
        let mut state = self.state.lock();
        if let Some(device) = state.devices.get_mut(&self.device_id) {
            device.playing = false;
            device.reader = None;
            device.on_error = None;
        }
        match state.stop_failures.get(&self.device_id) {
            Some(cause) => Err(RouterError::Backend(cause.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sink_buffer, SampleFormat, WriteOutcome};
    use std::time::Duration;

    fn format() -> AudioFormat {
        AudioFormat::new(48000, 2, SampleFormat::F32)
    }

    #[test]
    fn test_open_play_read() {
        let playback = MockPlayback::new();
        let (mut writer, reader) =
            sink_buffer(&format(), Duration::from_millis(100), Duration::from_secs(1));

        let mut stream = playback
            .open(&DeviceId::new("A"), &format(), reader, Box::new(|_: String| {}))
            .unwrap();
        stream.play().unwrap();
        assert!(playback.is_playing("A"));

        assert_eq!(writer.write(&[9u8; 32]), WriteOutcome::Written);
        assert_eq!(playback.available("A"), Some(32));
        assert_eq!(playback.read("A", 16), vec![9u8; 16]);
        assert_eq!(playback.available("A"), Some(16));
    }

    #[test]
    fn test_stop_releases_reader() {
        let playback = MockPlayback::new();
        let (_writer, reader) =
            sink_buffer(&format(), Duration::from_millis(100), Duration::from_secs(1));

        let mut stream = playback
            .open(&DeviceId::new("A"), &format(), reader, Box::new(|_: String| {}))
            .unwrap();
        stream.play().unwrap();
        stream.stop().unwrap();

        assert!(!playback.is_playing("A"));
        assert_eq!(playback.available("A"), None);
        assert!(playback.read("A", 16).is_empty());
    }

    #[test]
    fn test_open_failure() {
        let playback = MockPlayback::new().fail_open("B", "device in use");
        let (_writer, reader) =
            sink_buffer(&format(), Duration::from_millis(100), Duration::from_secs(1));

        let result = playback.open(&DeviceId::new("B"), &format(), reader, Box::new(|_: String| {}));
        assert!(matches!(
            result,
            Err(RouterError::DeviceInitFailed { .. })
        ));
        assert!(playback.opened().is_empty());
    }

    #[test]
    fn test_disconnect_fires_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let playback = MockPlayback::new();
        let (_writer, reader) =
            sink_buffer(&format(), Duration::from_millis(100), Duration::from_secs(1));
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();

        let _stream = playback
            .open(
                &DeviceId::new("A"),
                &format(),
                reader,
                Box::new(move |_: String| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        playback.disconnect("A", "unplugged");
        playback.disconnect("A", "unplugged");
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }
}
