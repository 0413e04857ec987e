//! Running-session resources and statistics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::sink::OutputSink;
use crate::{DeviceId, RouterError};

/// A device that could not be opened during `start()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDevice {
    /// The device that was skipped.
    pub device_id: DeviceId,
    /// Why it was skipped, normally `DeviceInitFailed`.
    pub error: RouterError,
}

/// Outcome of a successful [`Router::start()`](crate::Router::start).
///
/// A start with some skipped devices is still a success; the skipped list is
/// diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// Number of outputs that are playing.
    pub started_count: usize,
    /// Devices that failed to open, in configuration order.
    pub skipped_devices: Vec<SkippedDevice>,
}

impl StartReport {
    /// Returns `true` if every requested device started.
    pub fn is_complete(&self) -> bool {
        self.skipped_devices.is_empty()
    }
}

/// Statistics about the current (or most recent) running session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Blocks delivered by the capture source while running.
    pub blocks_captured: u64,
    /// Bytes delivered by the capture source while running.
    pub bytes_captured: u64,
    /// Per-sink block drops caused by full buffers, summed over all sinks.
    pub overflow_drops: u64,
    /// Fatal device errors reported by outputs or the capture source.
    pub fatal_errors: u64,
    /// Whether the capture source has failed; the session is dead if so.
    pub capture_failed: bool,
}

/// Counters shared between the router and the audio callbacks.
pub(crate) struct SessionCounters {
    pub blocks_captured: AtomicU64,
    pub bytes_captured: AtomicU64,
    pub overflow_drops: AtomicU64,
    pub fatal_errors: AtomicU64,
    pub capture_failed: AtomicBool,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self {
            blocks_captured: AtomicU64::new(0),
            bytes_captured: AtomicU64::new(0),
            overflow_drops: AtomicU64::new(0),
            fatal_errors: AtomicU64::new(0),
            capture_failed: AtomicBool::new(false),
        }
    }

    pub fn reset(&self) {
        self.blocks_captured.store(0, Ordering::SeqCst);
        self.bytes_captured.store(0, Ordering::SeqCst);
        self.overflow_drops.store(0, Ordering::SeqCst);
        self.fatal_errors.store(0, Ordering::SeqCst);
        self.capture_failed.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> RouterStats {
        RouterStats {
            blocks_captured: self.blocks_captured.load(Ordering::SeqCst),
            bytes_captured: self.bytes_captured.load(Ordering::SeqCst),
            overflow_drops: self.overflow_drops.load(Ordering::SeqCst),
            fatal_errors: self.fatal_errors.load(Ordering::SeqCst),
            capture_failed: self.capture_failed.load(Ordering::SeqCst),
        }
    }
}

/// Resources owned by one Running session.
///
/// Created at the end of a successful `start()` and consumed by `stop()`.
pub(crate) struct Session {
    pub sinks: Vec<OutputSink>,
    pub report: StartReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_reset() {
        let counters = SessionCounters::new();
        counters.blocks_captured.store(5, Ordering::SeqCst);
        counters.capture_failed.store(true, Ordering::SeqCst);

        counters.reset();
        assert_eq!(counters.snapshot(), RouterStats::default());
    }

    #[test]
    fn test_start_report_complete() {
        let report = StartReport {
            started_count: 2,
            skipped_devices: vec![],
        };
        assert!(report.is_complete());

        let partial = StartReport {
            started_count: 1,
            skipped_devices: vec![SkippedDevice {
                device_id: DeviceId::new("B"),
                error: RouterError::device_init_failed("B", "unplugged"),
            }],
        };
        assert!(!partial.is_complete());
    }
}
