//! Per-destination elastic buffer between the capture callback and one output.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::time::{Duration, Instant};

use crate::pipeline::overflow::{OverflowReport, OverflowTracker};
use crate::AudioFormat;

/// Result of offering a captured block to a sink buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The whole block was appended.
    Written,
    /// The block did not fit and was discarded.
    Dropped,
}

/// Producer half of a sink buffer, owned by the distribution path.
///
/// Writes never block and never grow the buffer: a block that does not fit
/// in the remaining space is discarded whole (drop-newest), which keeps the
/// buffer frame-aligned and leaves already-queued audio untouched.
pub struct SinkWriter {
    producer: ringbuf::HeapProd<u8>,
    overflow: OverflowTracker,
    capacity: usize,
}

impl SinkWriter {
    /// Appends `bytes`, or discards them all if they do not fit.
    pub fn write(&mut self, bytes: &[u8]) -> WriteOutcome {
        if bytes.is_empty() {
            return WriteOutcome::Written;
        }
        if self.producer.vacant_len() < bytes.len() {
            return WriteOutcome::Dropped;
        }

        let written = self.producer.push_slice(bytes);
        debug_assert_eq!(written, bytes.len());
        WriteOutcome::Written
    }

    /// Writes `bytes` and records a drop with the overflow tracker.
    ///
    /// Returns a report when a drop happened and the tracker's interval allows
    /// one to be emitted.
    pub(crate) fn write_tracked(
        &mut self,
        bytes: &[u8],
        now: Instant,
    ) -> (WriteOutcome, Option<OverflowReport>) {
        match self.write(bytes) {
            WriteOutcome::Written => (WriteOutcome::Written, None),
            WriteOutcome::Dropped => (
                WriteOutcome::Dropped,
                self.overflow.record(bytes.len(), now),
            ),
        }
    }

    /// Returns drops not yet covered by a report.
    pub(crate) fn flush_overflow(&mut self) -> Option<OverflowReport> {
        self.overflow.flush()
    }

    /// Total blocks dropped over the writer's lifetime.
    pub fn dropped_blocks(&self) -> u64 {
        self.overflow.total_blocks()
    }

    /// Bytes currently queued.
    pub fn occupied(&self) -> usize {
        self.producer.occupied_len()
    }

    /// Buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer half of a sink buffer, owned by one playback stream.
pub struct SinkReader {
    consumer: ringbuf::HeapCons<u8>,
    format: AudioFormat,
}

impl SinkReader {
    /// Moves up to `out.len()` queued bytes into `out`, in FIFO order.
    ///
    /// Returns the number of bytes copied. Zero means the producer has not
    /// caught up yet; playback should render silence for the gap.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.consumer.pop_slice(out)
    }

    /// Reads up to `max_bytes` into a new vector.
    pub fn read_vec(&mut self, max_bytes: usize) -> Vec<u8> {
        let mut out = vec![0u8; max_bytes.min(self.available())];
        let read = self.read(&mut out);
        out.truncate(read);
        out
    }

    /// Bytes ready to be read.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Format of the audio in this buffer.
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }
}

/// Creates a sink buffer pair holding `duration` of audio in `format`.
///
/// Capacity is rounded down to whole frames and never below one frame.
///
/// # Example
///
/// ```
/// use audio_fanout::{sink_buffer, AudioFormat, SampleFormat, WriteOutcome};
/// use std::time::Duration;
///
/// let format = AudioFormat::new(48000, 2, SampleFormat::F32);
/// let (mut writer, mut reader) =
///     sink_buffer(&format, Duration::from_secs(2), Duration::from_secs(1));
///
/// assert_eq!(writer.write(&[0u8; 4096]), WriteOutcome::Written);
/// assert_eq!(reader.read_vec(8192).len(), 4096);
/// ```
pub fn sink_buffer(
    format: &AudioFormat,
    duration: Duration,
    overflow_report_interval: Duration,
) -> (SinkWriter, SinkReader) {
    let capacity = format
        .bytes_for(duration)
        .max(format.bytes_per_frame())
        .max(1);

    let ring_buffer = HeapRb::<u8>::new(capacity);
    let (producer, consumer) = ring_buffer.split();

    let writer = SinkWriter {
        producer,
        overflow: OverflowTracker::new(overflow_report_interval),
        capacity,
    };
    let reader = SinkReader {
        consumer,
        format: *format,
    };

    (writer, reader)
}
