//! Fan-out of captured blocks into the per-sink buffers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::event::{emit, EventCallback};
use crate::pipeline::sink_buffer::{SinkWriter, WriteOutcome};
use crate::session::SessionCounters;
use crate::{AudioFormat, DeviceId, RouterEvent};

/// Lifecycle state of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouterState {
    /// No session; nothing is captured or played.
    #[default]
    Idle,
    /// Capture is being fanned out to at least one output.
    Running,
}

/// Write side of one active output.
pub(crate) struct SinkEntry {
    pub device_id: DeviceId,
    pub writer: SinkWriter,
    /// Cleared when the output reports a fatal error.
    pub alive: Arc<AtomicBool>,
}

struct Inner {
    state: RouterState,
    format: Option<AudioFormat>,
    entries: Vec<SinkEntry>,
}

/// State shared between the router and the capture callback.
///
/// Only the entry list and the state flag live behind the lock. Devices are
/// never opened, closed, or joined while it is held.
pub(crate) struct Distribution {
    inner: Mutex<Inner>,
    counters: SessionCounters,
    events: Option<EventCallback>,
}

impl Distribution {
    pub fn new(events: Option<EventCallback>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RouterState::Idle,
                format: None,
                entries: Vec::new(),
            }),
            counters: SessionCounters::new(),
            events,
        }
    }

    pub fn state(&self) -> RouterState {
        self.inner.lock().state
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.inner.lock().format
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    pub fn events(&self) -> Option<&EventCallback> {
        self.events.as_ref()
    }

    /// Installs the session's writers and marks the router Running.
    pub fn activate(&self, entries: Vec<SinkEntry>, format: AudioFormat) {
        let mut inner = self.inner.lock();
        inner.entries = entries;
        inner.format = Some(format);
        inner.state = RouterState::Running;
    }

    /// Marks the router Idle without releasing anything.
    ///
    /// Blocks arriving afterwards are ignored.
    pub fn halt(&self) {
        self.inner.lock().state = RouterState::Idle;
    }

    /// Marks the router Idle and hands back the writers.
    pub fn deactivate(&self) -> Vec<SinkEntry> {
        let mut inner = self.inner.lock();
        inner.state = RouterState::Idle;
        inner.format = None;
        std::mem::take(&mut inner.entries)
    }

    /// Devices whose writers are installed and have not failed.
    pub fn live_devices(&self) -> Vec<DeviceId> {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|e| e.alive.load(Ordering::Acquire))
            .map(|e| e.device_id.clone())
            .collect()
    }

    /// Copies one captured block into every live sink buffer.
    ///
    /// A no-op unless Running. A full buffer drops the block for that sink
    /// only. Overflow events are emitted after the lock is released.
    ///
    /// A trailing partial frame is discarded so every sink buffer stays
    /// frame-aligned.
    pub fn distribute(&self, block: &[u8]) {
        if block.is_empty() {
            return;
        }

        let now = Instant::now();
        let mut reports = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state != RouterState::Running || inner.entries.is_empty() {
                return;
            }

            let frame = inner.format.map_or(1, |f| f.bytes_per_frame().max(1));
            let partial = block.len() % frame;
            if partial != 0 {
                tracing::debug!(len = block.len(), frame, "trimming partial frame");
            }
            let block = &block[..block.len() - partial];
            if block.is_empty() {
                return;
            }

            self.counters.blocks_captured.fetch_add(1, Ordering::Relaxed);
            self.counters
                .bytes_captured
                .fetch_add(block.len() as u64, Ordering::Relaxed);

            for entry in &mut inner.entries {
                if !entry.alive.load(Ordering::Acquire) {
                    continue;
                }
                let (outcome, report) = entry.writer.write_tracked(block, now);
                if outcome == WriteOutcome::Dropped {
                    self.counters.overflow_drops.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(report) = report {
                    reports.push((entry.device_id.clone(), report));
                }
            }
        }

        for (device_id, report) in reports {
            tracing::warn!(
                device = %device_id,
                blocks = report.blocks,
                bytes = report.bytes,
                "sink buffer overflow, dropping captured audio"
            );
            emit(
                self.events.as_ref(),
                RouterEvent::OverflowDropped {
                    device_id,
                    dropped_blocks: report.blocks,
                    dropped_bytes: report.bytes,
                },
            );
        }
    }

    /// Handles a fatal error from one output device.
    ///
    /// The device is removed from distribution; the others keep playing.
    /// Repeated reports for the same device are ignored. When the last live
    /// output fails, distribution halts and a session-level
    /// `FatalDeviceError` without a device id follows.
    pub fn sink_failed(&self, device_id: &DeviceId, alive: &AtomicBool, cause: String) {
        if !alive.swap(false, Ordering::AcqRel) {
            return;
        }
        self.counters.fatal_errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(device = %device_id, "output device failed: {cause}");

        let none_left = {
            let mut inner = self.inner.lock();
            let none_left = inner.state == RouterState::Running
                && !inner.entries.iter().any(|e| e.alive.load(Ordering::Acquire));
            if none_left {
                inner.state = RouterState::Idle;
            }
            none_left
        };

        emit(
            self.events.as_ref(),
            RouterEvent::FatalDeviceError {
                device_id: Some(device_id.clone()),
                cause,
            },
        );

        if none_left {
            tracing::error!("every output device failed, routing halted");
            emit(
                self.events.as_ref(),
                RouterEvent::FatalDeviceError {
                    device_id: None,
                    cause: "no output devices left".to_string(),
                },
            );
        }
    }

    /// Handles a fatal error from the capture endpoint.
    pub fn capture_failed(&self, cause: String) {
        if self.counters.capture_failed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.counters.fatal_errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!("capture endpoint failed: {cause}");
        emit(
            self.events.as_ref(),
            RouterEvent::FatalDeviceError {
                device_id: None,
                cause,
            },
        );
    }
}
