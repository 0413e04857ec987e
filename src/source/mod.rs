//! Capture source abstraction.
//!
//! A capture source delivers the audio currently being rendered to the
//! system's default output, as raw interleaved PCM blocks in the endpoint's
//! own format. [`LoopbackCapture`] does this with cpal; [`MockCapture`] lets
//! tests push blocks by hand.

mod loopback;
mod mock;

pub use loopback::LoopbackCapture;
pub use mock::{MockCapture, MockCaptureHandle};

use crate::{AudioFormat, RouterError};

/// Receives one captured block. Runs on the audio thread.
pub type BlockCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Receives a fatal capture error. Runs on the audio thread.
pub type CaptureErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// A source of loopback audio.
///
/// The router calls [`open()`](Self::open) first to learn the format, then
/// [`start()`](Self::start) once every output is ready. [`stop()`](Self::stop)
/// must release the endpoint and be safe to call at any point, including
/// when the source was never started.
pub trait CaptureSource: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Acquires the endpoint and returns its native format.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no render endpoint exists or loopback
    /// access is denied, or `UnsupportedFormat` for sample encodings that
    /// cannot be passed through.
    fn open(&mut self) -> Result<AudioFormat, RouterError>;

    /// Begins delivering blocks.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the stream cannot be started.
    fn start(
        &mut self,
        on_block: BlockCallback,
        on_error: CaptureErrorCallback,
    ) -> Result<(), RouterError>;

    /// Stops delivery and releases the endpoint. Idempotent.
    fn stop(&mut self);
}
