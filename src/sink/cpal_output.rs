//! Shared-mode playback through cpal.

use std::time::Duration;

use cpal::traits::DeviceTrait;

use super::{PlaybackBackend, PlaybackErrorCallback, PlaybackStream};
use crate::device::open_render_device;
use crate::format::{decode_samples, PcmSample};
use crate::stream_thread::{fatal_error_callback, in_audio_callback, StreamThread};
use crate::{AudioFormat, DeviceId, RouterError, SampleFormat, SinkReader};

/// Opens output devices with cpal.
///
/// Each stream lives on its own thread. When the sink buffer runs dry the
/// callback renders silence for the gap.
#[derive(Debug, Clone)]
pub struct CpalPlayback {
    latency: Option<Duration>,
}

impl CpalPlayback {
    /// Creates a backend with an optional output latency hint.
    ///
    /// The hint becomes a fixed buffer size when the device supports it and
    /// is ignored otherwise.
    pub fn new(latency: Option<Duration>) -> Self {
        Self { latency }
    }
}

impl Default for CpalPlayback {
    fn default() -> Self {
        Self::new(Some(Duration::from_millis(100)))
    }
}

struct CpalPlaybackStream {
    device_id: DeviceId,
    thread: StreamThread,
}

impl PlaybackStream for CpalPlaybackStream {
    fn play(&mut self) -> Result<(), RouterError> {
        self.thread
            .play()
            .map_err(|e| RouterError::device_init_failed(&self.device_id, e))
    }

    fn stop(&mut self) -> Result<(), RouterError> {
        self.thread.stop();
        Ok(())
    }
}

impl PlaybackBackend for CpalPlayback {
    fn open(
        &self,
        device_id: &DeviceId,
        format: &AudioFormat,
        reader: SinkReader,
        on_error: PlaybackErrorCallback,
    ) -> Result<Box<dyn PlaybackStream>, RouterError> {
        let wanted_frames = self.latency.map(|l| format.frames_for(l));
        let format = *format;
        let id = device_id.clone();

        let thread = StreamThread::spawn(format!("fanout-out-{device_id}"), move || {
            let device = open_render_device(&id).map_err(|e| e.to_string())?;
            let buffer_frames = check_support(&device, &format, wanted_frames)?;
            let config = format.stream_config(buffer_frames);

            match format.sample_format {
                SampleFormat::I16 => build_playback::<i16>(&device, &config, reader, on_error),
                SampleFormat::I32 => build_playback::<i32>(&device, &config, reader, on_error),
                SampleFormat::F32 => build_playback::<f32>(&device, &config, reader, on_error),
            }
        })
        .map_err(|e| RouterError::device_init_failed(device_id, e))?;

        tracing::debug!(device = %device_id, %format, "output stream built");
        Ok(Box::new(CpalPlaybackStream {
            device_id: device_id.clone(),
            thread,
        }))
    }
}

/// Verifies the device can play `format` and picks a buffer size.
fn check_support(
    device: &cpal::Device,
    format: &AudioFormat,
    wanted_frames: Option<u32>,
) -> Result<Option<u32>, String> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| e.to_string())?;

    let mut supported = false;
    let mut buffer_frames = None;
    for range in ranges {
        let matches = range.channels() == format.channels
            && range.sample_format() == format.sample_format.to_cpal()
            && range.min_sample_rate().0 <= format.sample_rate
            && format.sample_rate <= range.max_sample_rate().0;
        if !matches {
            continue;
        }
        supported = true;
        if let (Some(wanted), cpal::SupportedBufferSize::Range { min, max }) =
            (wanted_frames, range.buffer_size())
        {
            if (*min..=*max).contains(&wanted) {
                buffer_frames = Some(wanted);
            }
        }
    }

    if !supported {
        return Err(format!("device does not support {format}"));
    }
    Ok(buffer_frames)
}

fn build_playback<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut reader: SinkReader,
    on_error: PlaybackErrorCallback,
) -> Result<cpal::Stream, String>
where
    T: PcmSample + cpal::SizedSample,
{
    let mut scratch: Vec<u8> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                in_audio_callback(|| {
                    let needed = data.len() * T::SIZE;
                    if scratch.len() < needed {
                        scratch.resize(needed, 0);
                    }
                    let read = reader.read(&mut scratch[..needed]);
                    decode_samples(&scratch[..read], data);
                });
            },
            fatal_error_callback(on_error),
            None,
        )
        .map_err(|e| e.to_string())
}
