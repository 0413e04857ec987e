//! Playback backends and the per-device output sink.
//!
//! An [`OutputSink`] plays one [`SinkReader`] on one device. The router
//! opens sinks through a [`PlaybackBackend`]; the crate provides two:
//!
//! - [`CpalPlayback`]: shared-mode output through cpal
//! - [`MockPlayback`]: in-memory devices for tests
//!
//! Implement [`PlaybackBackend`] to drive other outputs.

mod cpal_output;
mod mock;

pub use cpal_output::CpalPlayback;
pub use mock::MockPlayback;

use crate::{AudioFormat, DeviceId, RouterError, SinkReader};

/// Receives a fatal playback error. Runs on the audio thread.
pub type PlaybackErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// Opens playback streams on devices.
///
/// # Example
///
/// ```
/// use audio_fanout::sink::{PlaybackBackend, PlaybackErrorCallback, PlaybackStream};
/// use audio_fanout::{AudioFormat, DeviceId, RouterError, SinkReader};
///
/// struct NullStream;
///
/// impl PlaybackStream for NullStream {
///     fn play(&mut self) -> Result<(), RouterError> {
///         Ok(())
///     }
///
///     fn stop(&mut self) -> Result<(), RouterError> {
///         Ok(())
///     }
/// }
///
/// struct NullBackend;
///
/// impl PlaybackBackend for NullBackend {
///     fn open(
///         &self,
///         _device_id: &DeviceId,
///         _format: &AudioFormat,
///         _reader: SinkReader,
///         _on_error: PlaybackErrorCallback,
///     ) -> Result<Box<dyn PlaybackStream>, RouterError> {
///         Ok(Box::new(NullStream))
///     }
/// }
/// ```
pub trait PlaybackBackend: Send + Sync {
    /// Opens `device_id` for playback of `format`, pulling audio from `reader`.
    ///
    /// The stream must not produce sound until [`PlaybackStream::play`].
    ///
    /// # Errors
    ///
    /// Returns an error if the device is missing, busy, or cannot accept
    /// `format`.
    fn open(
        &self,
        device_id: &DeviceId,
        format: &AudioFormat,
        reader: SinkReader,
        on_error: PlaybackErrorCallback,
    ) -> Result<Box<dyn PlaybackStream>, RouterError>;
}

/// An opened playback stream.
pub trait PlaybackStream: Send {
    /// Starts pulling audio from the sink buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the device refuses to start.
    fn play(&mut self) -> Result<(), RouterError>;

    /// Stops playback and releases the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device reported a failure while closing. The
    /// device is considered released either way.
    fn stop(&mut self) -> Result<(), RouterError>;
}

/// One playing output device.
///
/// Owns the consumer half of its sink buffer (inside the stream). Stopping
/// is idempotent and also happens on drop.
pub struct OutputSink {
    device_id: DeviceId,
    stream: Box<dyn PlaybackStream>,
    stopped: bool,
}

impl OutputSink {
    /// Opens a sink on `device_id`.
    ///
    /// Any backend failure is reported as `DeviceInitFailed` for this device.
    pub(crate) fn open(
        backend: &dyn PlaybackBackend,
        device_id: &DeviceId,
        format: &AudioFormat,
        reader: SinkReader,
        on_error: PlaybackErrorCallback,
    ) -> Result<Self, RouterError> {
        let stream = backend
            .open(device_id, format, reader, on_error)
            .map_err(|e| as_init_failure(device_id, e))?;

        Ok(Self {
            device_id: device_id.clone(),
            stream,
            stopped: false,
        })
    }

    /// The device this sink plays on.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Starts playback.
    pub(crate) fn play(&mut self) -> Result<(), RouterError> {
        self.stream
            .play()
            .map_err(|e| as_init_failure(&self.device_id, e))
    }

    /// Stops playback. Later calls do nothing.
    pub(crate) fn stop(&mut self) -> Result<(), RouterError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.stream.stop()
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(device = %self.device_id, "error stopping output: {e}");
        }
    }
}

fn as_init_failure(device_id: &DeviceId, error: RouterError) -> RouterError {
    match error {
        RouterError::DeviceInitFailed { .. } => error,
        other => RouterError::device_init_failed(device_id, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sink_buffer, SampleFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingStream {
        stops: Arc<AtomicUsize>,
    }

    impl PlaybackStream for CountingStream {
        fn play(&mut self) -> Result<(), RouterError> {
            Ok(())
        }

        fn stop(&mut self) -> Result<(), RouterError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingBackend {
        stops: Arc<AtomicUsize>,
    }

    impl PlaybackBackend for CountingBackend {
        fn open(
            &self,
            device_id: &DeviceId,
            _format: &AudioFormat,
            _reader: SinkReader,
            _on_error: PlaybackErrorCallback,
        ) -> Result<Box<dyn PlaybackStream>, RouterError> {
            if device_id.as_str() == "missing" {
                return Err(RouterError::DeviceNotFound {
                    device_id: device_id.clone(),
                });
            }
            Ok(Box::new(CountingStream {
                stops: self.stops.clone(),
            }))
        }
    }

    fn reader() -> SinkReader {
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);
        sink_buffer(&format, Duration::from_millis(10), Duration::from_secs(1)).1
    }

    #[test]
    fn test_stop_is_idempotent() {
        let stops = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            stops: stops.clone(),
        };
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);

        let mut sink = OutputSink::open(
            &backend,
            &DeviceId::new("A"),
            &format,
            reader(),
            Box::new(|_: String| {}),
        )
        .unwrap();
        sink.play().unwrap();
        sink.stop().unwrap();
        sink.stop().unwrap();
        drop(sink);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_stops_stream() {
        let stops = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            stops: stops.clone(),
        };
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);

        let sink = OutputSink::open(
            &backend,
            &DeviceId::new("A"),
            &format,
            reader(),
            Box::new(|_: String| {}),
        )
        .unwrap();
        drop(sink);

        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_open_failure_becomes_init_failed() {
        let backend = CountingBackend {
            stops: Arc::new(AtomicUsize::new(0)),
        };
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);

        let result = OutputSink::open(
            &backend,
            &DeviceId::new("missing"),
            &format,
            reader(),
            Box::new(|_: String| {}),
        );

        match result {
            Err(RouterError::DeviceInitFailed { device_id, cause }) => {
                assert_eq!(device_id.as_str(), "missing");
                assert!(cause.contains("device not found"));
            }
            _ => panic!("expected DeviceInitFailed"),
        }
    }
}
