//! The multi-output router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::emit;
use crate::pipeline::{sink_buffer, Distribution, RouterState, SinkEntry};
use crate::session::{Session, SkippedDevice, StartReport};
use crate::sink::{OutputSink, PlaybackBackend, PlaybackErrorCallback};
use crate::source::{BlockCallback, CaptureErrorCallback, CaptureSource};
use crate::stream_thread::is_audio_callback;
use crate::{
    AudioFormat, DeviceId, EventCallback, RouterBuilder, RouterConfig, RouterError, RouterEvent,
    RouterOptions, RouterStats,
};

struct Lifecycle {
    capture: Box<dyn CaptureSource>,
    session: Option<Session>,
}

/// Fans the system's loopback audio out to several playback devices.
///
/// A router is created Idle. [`start()`](Self::start) opens the capture
/// endpoint and every target device, skipping the ones that fail, and
/// returns Running as long as at least one output started.
/// [`stop()`](Self::stop) releases everything; the router can then be
/// started again. Dropping a running router stops it.
///
/// All methods take `&self` and may be called from any thread, including
/// from inside an event callback.
///
/// # Example
///
/// ```no_run
/// use audio_fanout::Router;
///
/// # fn main() -> Result<(), audio_fanout::RouterError> {
/// let router = Router::new(["Speakers (Realtek)", "Headphones (USB)"])?;
/// let report = router.start()?;
/// for skipped in &report.skipped_devices {
///     eprintln!("skipped {}: {}", skipped.device_id, skipped.error);
/// }
///
/// // ... later
/// router.stop();
/// # Ok(())
/// # }
/// ```
pub struct Router {
    config: RouterConfig,
    options: RouterOptions,
    playback: Arc<dyn PlaybackBackend>,
    lifecycle: Mutex<Lifecycle>,
    distribution: Arc<Distribution>,
    stop_requested: AtomicBool,
}

impl Router {
    /// Creates an idle router for the given devices using the system audio
    /// backends.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than two distinct devices were given.
    pub fn new<I, D>(device_ids: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        RouterBuilder::new(device_ids).build()
    }

    /// Creates a builder for configuring a router.
    pub fn builder<I, D>(device_ids: I) -> RouterBuilder
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        RouterBuilder::new(device_ids)
    }

    pub(crate) fn from_parts(
        config: RouterConfig,
        options: RouterOptions,
        capture: Box<dyn CaptureSource>,
        playback: Arc<dyn PlaybackBackend>,
        events: Option<EventCallback>,
    ) -> Self {
        Self {
            config,
            options,
            playback,
            lifecycle: Mutex::new(Lifecycle {
                capture,
                session: None,
            }),
            distribution: Arc::new(Distribution::new(events)),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// The target devices.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// The buffer and reporting options.
    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// Starts routing.
    ///
    /// Opens the capture endpoint, then every target device in order.
    /// Devices that fail to open are listed in the report and skipped.
    /// Calling `start()` on a running router returns the current session's
    /// report and changes nothing.
    ///
    /// # Errors
    ///
    /// - `DeviceUnavailable` if the capture endpoint cannot be opened,
    ///   including when its sample format cannot be passed through
    /// - `NoSinksAvailable` if every target device failed
    ///
    /// On error the router is Idle and holds no devices.
    pub fn start(&self) -> Result<StartReport, RouterError> {
        let mut lifecycle = self.lifecycle.lock();
        let mut events = Vec::new();

        if let Some(session) = &lifecycle.session {
            if self.distribution.state() == RouterState::Running {
                tracing::debug!("start() while running, keeping current session");
                return Ok(session.report.clone());
            }
            // Halted from a callback but not yet torn down
            events = self.teardown(&mut lifecycle);
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        let result = self.start_session(&mut lifecycle, &mut events);
        drop(lifecycle);

        for event in events {
            emit(self.distribution.events(), event);
        }

        if result.is_ok() && self.stop_requested.swap(false, Ordering::SeqCst) {
            tracing::debug!("stop requested during start");
            self.stop();
        }
        result
    }

    fn start_session(
        &self,
        lifecycle: &mut Lifecycle,
        events: &mut Vec<RouterEvent>,
    ) -> Result<StartReport, RouterError> {
        self.config.validate()?;
        self.distribution.counters().reset();

        let format = lifecycle.capture.open().map_err(capture_error)?;
        tracing::info!(
            capture = lifecycle.capture.name(),
            %format,
            devices = self.config.len(),
            "starting router"
        );

        let (sinks, entries, skipped_devices) = self.open_sinks(&format, events);
        if sinks.is_empty() {
            lifecycle.capture.stop();
            let attempted = self.config.len();
            tracing::error!(attempted, "no output devices could be initialized");
            return Err(RouterError::NoSinksAvailable { attempted });
        }

        self.distribution.activate(entries, format);
        let (on_block, on_error) = self.capture_callbacks();
        if let Err(e) = lifecycle.capture.start(on_block, on_error) {
            let entries = self.distribution.deactivate();
            lifecycle.capture.stop();
            drop(sinks);
            drop(entries);
            let e = capture_error(e);
            tracing::error!("capture failed to start: {e}");
            return Err(e);
        }

        let report = StartReport {
            started_count: sinks.len(),
            skipped_devices,
        };
        tracing::info!(
            started = report.started_count,
            skipped = report.skipped_devices.len(),
            "router running"
        );
        events.push(RouterEvent::Started {
            started_count: report.started_count,
            skipped_count: report.skipped_devices.len(),
        });

        lifecycle.session = Some(Session {
            sinks,
            report: report.clone(),
        });
        Ok(report)
    }

    /// Opens every target device, collecting the ones that fail.
    fn open_sinks(
        &self,
        format: &AudioFormat,
        events: &mut Vec<RouterEvent>,
    ) -> (Vec<OutputSink>, Vec<SinkEntry>, Vec<SkippedDevice>) {
        let mut sinks = Vec::with_capacity(self.config.len());
        let mut entries = Vec::with_capacity(self.config.len());
        let mut skipped = Vec::new();

        for device_id in self.config.device_ids() {
            let (writer, reader) = sink_buffer(
                format,
                self.options.buffer_duration,
                self.options.overflow_report_interval,
            );
            let alive = Arc::new(AtomicBool::new(true));
            let on_error = self.sink_error_callback(device_id, &alive);

            let opened =
                OutputSink::open(self.playback.as_ref(), device_id, format, reader, on_error)
                    .and_then(|mut sink| sink.play().map(|()| sink));

            match opened {
                Ok(sink) => {
                    tracing::info!(device = %device_id, "output started");
                    events.push(RouterEvent::SinkStarted {
                        device_id: device_id.clone(),
                    });
                    entries.push(SinkEntry {
                        device_id: device_id.clone(),
                        writer,
                        alive,
                    });
                    sinks.push(sink);
                }
                Err(error) => {
                    tracing::warn!(device = %device_id, "skipping output: {error}");
                    events.push(RouterEvent::SinkSkipped {
                        device_id: device_id.clone(),
                        reason: error.to_string(),
                    });
                    skipped.push(SkippedDevice {
                        device_id: device_id.clone(),
                        error,
                    });
                }
            }
        }

        (sinks, entries, skipped)
    }

    fn sink_error_callback(
        &self,
        device_id: &DeviceId,
        alive: &Arc<AtomicBool>,
    ) -> PlaybackErrorCallback {
        let distribution = Arc::clone(&self.distribution);
        let device_id = device_id.clone();
        let alive = Arc::clone(alive);
        Box::new(move |cause: String| distribution.sink_failed(&device_id, &alive, cause))
    }

    fn capture_callbacks(&self) -> (BlockCallback, CaptureErrorCallback) {
        let distribution = Arc::clone(&self.distribution);
        let on_block: BlockCallback = Box::new(move |block: &[u8]| distribution.distribute(block));

        let distribution = Arc::clone(&self.distribution);
        let on_error: CaptureErrorCallback =
            Box::new(move |cause: String| distribution.capture_failed(cause));

        (on_block, on_error)
    }

    /// Stops routing and releases every device. Idempotent.
    ///
    /// Distribution stops before any device is closed, so no block is
    /// delivered after this returns. When called from an event handler
    /// while another thread is starting or stopping the router, delivery is
    /// halted immediately and that thread finishes the teardown.
    pub fn stop(&self) {
        let mut lifecycle = if is_audio_callback() {
            if let Some(guard) = self.lifecycle.try_lock() {
                guard
            } else {
                self.distribution.halt();
                self.stop_requested.store(true, Ordering::SeqCst);
                return;
            }
        } else {
            self.lifecycle.lock()
        };

        let events = self.teardown(&mut lifecycle);
        drop(lifecycle);

        for event in events {
            emit(self.distribution.events(), event);
        }
    }

    /// Releases the current session, returning the events to emit.
    fn teardown(&self, lifecycle: &mut Lifecycle) -> Vec<RouterEvent> {
        let Some(session) = lifecycle.session.take() else {
            return Vec::new();
        };

        let entries = self.distribution.deactivate();
        lifecycle.capture.stop();

        for mut sink in session.sinks {
            if let Err(e) = sink.stop() {
                tracing::error!(device = %sink.device_id(), "error stopping output: {e}");
            }
        }

        let mut events: Vec<RouterEvent> = entries
            .into_iter()
            .filter_map(|mut entry| {
                let report = entry.writer.flush_overflow()?;
                Some(RouterEvent::OverflowDropped {
                    device_id: entry.device_id,
                    dropped_blocks: report.blocks,
                    dropped_bytes: report.bytes,
                })
            })
            .collect();
        events.push(RouterEvent::Stopped);

        tracing::info!("router stopped");
        events
    }

    /// Returns `true` while audio is being distributed.
    pub fn is_running(&self) -> bool {
        self.state() == RouterState::Running
    }

    /// The current lifecycle state.
    pub fn state(&self) -> RouterState {
        self.distribution.state()
    }

    /// Format of the running session's audio, or `None` when idle.
    pub fn format(&self) -> Option<AudioFormat> {
        self.distribution.format()
    }

    /// Devices currently receiving audio.
    ///
    /// Outputs that failed mid-session are excluded.
    pub fn active_devices(&self) -> Vec<DeviceId> {
        self.distribution.live_devices()
    }

    /// Statistics for the current or most recent session.
    pub fn stats(&self) -> RouterStats {
        self.distribution.counters().snapshot()
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_error(error: RouterError) -> RouterError {
    match error {
        RouterError::DeviceUnavailable { .. } => error,
        // Carries the format name through the display text
        other => RouterError::device_unavailable(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockPlayback;
    use crate::source::{MockCapture, MockCaptureHandle};

    fn assert_send_sync<T: Send + Sync>() {}

    fn mock_router(ids: &[&str], playback: MockPlayback) -> (Router, MockCaptureHandle) {
        let (capture, handle) = MockCapture::stereo_f32();
        let router = Router::builder(ids.iter().copied())
            .capture(capture)
            .playback(playback)
            .build()
            .unwrap();
        (router, handle)
    }

    #[test]
    fn test_router_is_send_sync() {
        assert_send_sync::<Router>();
    }

    #[test]
    fn test_new_router_is_idle() {
        let (router, _handle) = mock_router(&["A", "B"], MockPlayback::new());
        assert_eq!(router.state(), RouterState::Idle);
        assert_eq!(router.format(), None);
        assert!(router.active_devices().is_empty());
    }

    #[test]
    fn test_start_reports_format_and_devices() {
        let (router, _handle) = mock_router(&["A", "B"], MockPlayback::new());
        let report = router.start().unwrap();

        assert_eq!(report.started_count, 2);
        assert!(report.is_complete());
        assert_eq!(
            router.format(),
            Some(AudioFormat::new(48000, 2, crate::SampleFormat::F32))
        );
        assert_eq!(
            router.active_devices(),
            vec![DeviceId::new("A"), DeviceId::new("B")]
        );
    }

    #[test]
    fn test_start_twice_returns_same_report() {
        let playback = MockPlayback::new();
        let (router, handle) = mock_router(&["A", "B"], playback.clone());

        let first = router.start().unwrap();
        let second = router.start().unwrap();
        assert_eq!(first, second);
        assert_eq!(handle.open_count(), 1);
        assert_eq!(playback.opened().len(), 2);
    }

    #[test]
    fn test_capture_open_error_is_device_unavailable() {
        let (capture, _handle) = MockCapture::stereo_f32();
        let capture = capture.with_open_error(RouterError::Backend("host gone".into()));
        let router = Router::builder(["A", "B"])
            .capture(capture)
            .playback(MockPlayback::new())
            .build()
            .unwrap();

        let result = router.start();
        assert!(matches!(result, Err(RouterError::DeviceUnavailable { .. })));
        assert!(!router.is_running());
    }

    #[test]
    fn test_unsupported_capture_format_is_device_unavailable() {
        let (capture, _handle) = MockCapture::stereo_f32();
        let capture = capture.with_open_error(RouterError::UnsupportedFormat {
            format: "U8".into(),
        });
        let playback = MockPlayback::new();
        let router = Router::builder(["A", "B"])
            .capture(capture)
            .playback(playback.clone())
            .build()
            .unwrap();

        match router.start() {
            Err(RouterError::DeviceUnavailable { reason }) => assert!(reason.contains("U8")),
            other => panic!("expected DeviceUnavailable, got {other:?}"),
        }
        assert!(!router.is_running());
        assert!(playback.opened().is_empty());
    }

    #[test]
    fn test_restart_after_stop() {
        let playback = MockPlayback::new();
        let (router, handle) = mock_router(&["A", "B"], playback.clone());

        router.start().unwrap();
        router.stop();
        assert!(!router.is_running());

        router.start().unwrap();
        assert!(router.is_running());
        assert!(handle.push_block(&[1u8; 8]));
        assert_eq!(playback.read("A", 64), vec![1u8; 8]);
        assert_eq!(handle.open_count(), 2);
    }

    #[test]
    fn test_stats_count_blocks() {
        let (router, handle) = mock_router(&["A", "B"], MockPlayback::new());
        router.start().unwrap();

        handle.push_block(&[0u8; 16]);
        handle.push_block(&[0u8; 16]);

        let stats = router.stats();
        assert_eq!(stats.blocks_captured, 2);
        assert_eq!(stats.bytes_captured, 32);
        assert_eq!(stats.overflow_drops, 0);
    }

    #[test]
    fn test_drop_releases_devices() {
        let playback = MockPlayback::new();
        let (router, handle) = mock_router(&["A", "B"], playback.clone());
        router.start().unwrap();

        drop(router);
        assert!(!playback.is_playing("A"));
        assert!(!playback.is_playing("B"));
        assert!(!handle.is_started());
    }
}
