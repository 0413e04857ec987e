//! Loopback capture of the default render endpoint via cpal.
//!
//! On WASAPI, building an input stream on an output device captures what is
//! being played to it. Other hosts reject this, which surfaces as
//! `DeviceUnavailable` from `start()`.

use cpal::traits::{DeviceTrait, HostTrait};

use super::{BlockCallback, CaptureErrorCallback, CaptureSource};
use crate::format::{encode_samples, PcmSample};
use crate::stream_thread::{fatal_error_callback, in_audio_callback, StreamThread};
use crate::{AudioFormat, RouterError, SampleFormat};

/// Captures the system mix from the default output device.
///
/// The device is resolved again on the stream thread when capture starts;
/// if the default endpoint changed format in between, `start()` fails.
pub struct LoopbackCapture {
    format: Option<AudioFormat>,
    thread: Option<StreamThread>,
}

impl LoopbackCapture {
    /// Creates a capture source. Nothing is opened until `open()`.
    pub fn new() -> Self {
        Self {
            format: None,
            thread: None,
        }
    }
}

impl Default for LoopbackCapture {
    fn default() -> Self {
        Self::new()
    }
}

fn default_endpoint() -> Result<(cpal::Device, AudioFormat), RouterError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| RouterError::device_unavailable("no default render endpoint"))?;
    let config = device
        .default_output_config()
        .map_err(RouterError::device_unavailable)?;

    let sample_format =
        SampleFormat::from_cpal(config.sample_format()).ok_or_else(|| {
            RouterError::UnsupportedFormat {
                format: format!("{:?}", config.sample_format()),
            }
        })?;

    let format = AudioFormat::new(config.sample_rate().0, config.channels(), sample_format);
    Ok((device, format))
}

fn build_capture<T>(
    device: &cpal::Device,
    format: &AudioFormat,
    mut on_block: BlockCallback,
    on_error: CaptureErrorCallback,
) -> Result<cpal::Stream, String>
where
    T: PcmSample + cpal::SizedSample,
{
    let mut scratch: Vec<u8> = Vec::new();
    device
        .build_input_stream(
            &format.stream_config(None),
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                in_audio_callback(|| {
                    encode_samples(data, &mut scratch);
                    on_block(&scratch);
                });
            },
            fatal_error_callback(on_error),
            None,
        )
        .map_err(|e| e.to_string())
}

impl CaptureSource for LoopbackCapture {
    fn name(&self) -> &str {
        "wasapi-loopback"
    }

    fn open(&mut self) -> Result<AudioFormat, RouterError> {
        let (device, format) = default_endpoint()?;
        tracing::info!(
            endpoint = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            %format,
            "opened loopback endpoint"
        );
        self.format = Some(format);
        Ok(format)
    }

    fn start(
        &mut self,
        on_block: BlockCallback,
        on_error: CaptureErrorCallback,
    ) -> Result<(), RouterError> {
        let expected = self
            .format
            .ok_or_else(|| RouterError::device_unavailable("capture started before open"))?;

        let thread = StreamThread::spawn("fanout-capture", move || {
            let (device, format) = default_endpoint().map_err(|e| e.to_string())?;
            if format != expected {
                return Err(format!(
                    "render endpoint changed format from {expected} to {format}"
                ));
            }
            match format.sample_format {
                SampleFormat::I16 => build_capture::<i16>(&device, &format, on_block, on_error),
                SampleFormat::I32 => build_capture::<i32>(&device, &format, on_block, on_error),
                SampleFormat::F32 => build_capture::<f32>(&device, &format, on_block, on_error),
            }
        })
        .map_err(RouterError::device_unavailable)?;

        thread.play().map_err(RouterError::device_unavailable)?;
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
            tracing::debug!("loopback capture stopped");
        }
        self.format = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_before_open_fails() {
        let mut capture = LoopbackCapture::new();
        let result = capture.start(Box::new(|_: &[u8]| {}), Box::new(|_: String| {}));
        assert!(matches!(result, Err(RouterError::DeviceUnavailable { .. })));
    }

    #[test]
    fn test_stop_without_start() {
        let mut capture = LoopbackCapture::new();
        capture.stop();
        capture.stop();
    }

    #[test]
    #[ignore = "requires a Windows render endpoint"]
    fn test_open_default_endpoint() {
        let mut capture = LoopbackCapture::new();
        let format = capture.open().unwrap();
        assert!(format.sample_rate > 0);
        assert!(format.channels > 0);
        capture.stop();
    }
}
