//! Rate limiting for overflow reports.

use std::time::{Duration, Instant};

/// Aggregated drops since the previous report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OverflowReport {
    pub blocks: u64,
    pub bytes: u64,
}

/// Counts drops for one sink and decides when a report may be emitted.
///
/// The first drop is reported immediately. Later drops inside the interval
/// are accumulated and folded into the next report.
#[derive(Debug)]
pub(crate) struct OverflowTracker {
    interval: Duration,
    last_report: Option<Instant>,
    pending_blocks: u64,
    pending_bytes: u64,
    total_blocks: u64,
}

impl OverflowTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: None,
            pending_blocks: 0,
            pending_bytes: 0,
            total_blocks: 0,
        }
    }

    /// Records one dropped block of `bytes` bytes.
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<OverflowReport> {
        self.pending_blocks += 1;
        self.pending_bytes += bytes as u64;
        self.total_blocks += 1;

        let due = self
            .last_report
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval);
        if !due {
            return None;
        }

        self.last_report = Some(now);
        self.take()
    }

    /// Returns any drops not yet reported.
    pub fn flush(&mut self) -> Option<OverflowReport> {
        self.take()
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn take(&mut self) -> Option<OverflowReport> {
        if self.pending_blocks == 0 {
            return None;
        }
        let report = OverflowReport {
            blocks: self.pending_blocks,
            bytes: self.pending_bytes,
        };
        self.pending_blocks = 0;
        self.pending_bytes = 0;
        Some(report)
    }
}
