//! Session audio format and raw PCM byte helpers.
//!
//! Captured blocks travel through the router as raw bytes in the capture
//! endpoint's native layout. Nothing here converts between formats; the
//! helpers only move typed samples in and out of byte buffers.

use std::time::Duration;

/// Sample encodings the router can pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// 32-bit IEEE float.
    F32,
}

impl SampleFormat {
    /// Size of one sample in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }

    pub(crate) fn from_cpal(format: cpal::SampleFormat) -> Option<Self> {
        match format {
            cpal::SampleFormat::I16 => Some(Self::I16),
            cpal::SampleFormat::I32 => Some(Self::I32),
            cpal::SampleFormat::F32 => Some(Self::F32),
            _ => None,
        }
    }

    pub(crate) const fn to_cpal(self) -> cpal::SampleFormat {
        match self {
            Self::I16 => cpal::SampleFormat::I16,
            Self::I32 => cpal::SampleFormat::I32,
            Self::F32 => cpal::SampleFormat::F32,
        }
    }
}

/// Format of a capture session, fixed when the capture source is opened.
///
/// Every sink buffer in a session is created with this exact format.
///
/// # Example
///
/// ```
/// use audio_fanout::{AudioFormat, SampleFormat};
/// use std::time::Duration;
///
/// let format = AudioFormat::new(48000, 2, SampleFormat::F32);
/// assert_eq!(format.bytes_per_frame(), 8);
/// assert_eq!(format.bytes_per_second(), 384_000);
/// assert_eq!(format.bytes_for(Duration::from_secs(2)), 768_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Encoding of each sample.
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Creates a format description.
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Bits per sample.
    #[must_use]
    pub const fn bits_per_sample(&self) -> u16 {
        (self.sample_format.bytes() * 8) as u16
    }

    /// Bytes per sample.
    #[must_use]
    pub const fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes()
    }

    /// Bytes per interleaved frame (block align).
    #[must_use]
    pub const fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes() * self.channels as usize
    }

    /// Bytes per second of audio.
    #[must_use]
    pub const fn bytes_per_second(&self) -> usize {
        self.bytes_per_frame() * self.sample_rate as usize
    }

    /// Number of bytes holding `duration` of audio, rounded down to a whole frame.
    #[must_use]
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let frames = (f64::from(self.sample_rate) * duration.as_secs_f64()) as usize;
        frames * self.bytes_per_frame()
    }

    /// Number of frames in `duration`, as a cpal buffer size hint.
    pub(crate) fn frames_for(&self, duration: Duration) -> u32 {
        (f64::from(self.sample_rate) * duration.as_secs_f64()) as u32
    }

    pub(crate) fn stream_config(&self, buffer_frames: Option<u32>) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: buffer_frames.map_or(cpal::BufferSize::Default, cpal::BufferSize::Fixed),
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}bit {:?}",
            self.sample_rate,
            self.channels,
            self.bits_per_sample(),
            self.sample_format
        )
    }
}

/// A sample type that can be copied to and from native-endian bytes.
pub(crate) trait PcmSample: Copy + Send + 'static {
    const SIZE: usize;
    const SILENCE: Self;

    fn write_ne(self, out: &mut [u8]);
    fn read_ne(bytes: &[u8]) -> Self;
}

macro_rules! impl_pcm_sample {
    ($ty:ty, $silence:expr) => {
        impl PcmSample for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();
            const SILENCE: Self = $silence;

            #[inline]
            fn write_ne(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }

            #[inline]
            fn read_ne(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }
        }
    };
}

impl_pcm_sample!(i16, 0);
impl_pcm_sample!(i32, 0);
impl_pcm_sample!(f32, 0.0);

/// Encodes `samples` into `out`, reusing its allocation.
///
/// `out` only grows when a callback delivers more samples than any before it.
pub(crate) fn encode_samples<T: PcmSample>(samples: &[T], out: &mut Vec<u8>) {
    out.resize(samples.len() * T::SIZE, 0);
    for (sample, chunk) in samples.iter().zip(out.chunks_exact_mut(T::SIZE)) {
        sample.write_ne(chunk);
    }
}

/// Decodes whole samples from `bytes` into `out`, filling the rest with silence.
///
/// Returns the number of samples decoded.
pub(crate) fn decode_samples<T: PcmSample>(bytes: &[u8], out: &mut [T]) -> usize {
    let mut decoded = 0;
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
        *slot = T::read_ne(chunk);
        decoded += 1;
    }
    for slot in &mut out[decoded..] {
        *slot = T::SILENCE;
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        let format = AudioFormat::new(44100, 2, SampleFormat::I16);
        assert_eq!(format.bits_per_sample(), 16);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.bytes_per_second(), 176_400);
    }

    #[test]
    fn test_bytes_for_rounds_to_frame() {
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);
        let bytes = format.bytes_for(Duration::from_micros(10));
        assert_eq!(bytes % format.bytes_per_frame(), 0);
    }

    #[test]
    fn test_format_display() {
        let format = AudioFormat::new(48000, 2, SampleFormat::F32);
        assert_eq!(format.to_string(), "48000Hz 2ch 32bit F32");
    }

    #[test]
    fn test_cpal_sample_format_mapping() {
        assert_eq!(
            SampleFormat::from_cpal(cpal::SampleFormat::F32),
            Some(SampleFormat::F32)
        );
        assert_eq!(SampleFormat::from_cpal(cpal::SampleFormat::U8), None);
        assert_eq!(SampleFormat::I16.to_cpal(), cpal::SampleFormat::I16);
    }

    #[test]
    fn test_encode_reuses_buffer() {
        let mut out = Vec::with_capacity(64);
        encode_samples(&[1i16, -1, 300], &mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(&out[0..2], &1i16.to_ne_bytes());

        encode_samples(&[7i16], &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_decode_pads_with_silence() {
        let mut bytes = Vec::new();
        encode_samples(&[0.5f32, -0.25], &mut bytes);

        let mut out = [9.0f32; 4];
        let decoded = decode_samples(&bytes, &mut out);

        assert_eq!(decoded, 2);
        assert_eq!(out, [0.5, -0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_decode_ignores_partial_sample() {
        let bytes = [1u8, 0, 0];
        let mut out = [5i16; 2];
        let decoded = decode_samples(&bytes, &mut out);
        assert_eq!(decoded, 1);
        assert_eq!(out[1], 0);
    }
}
