//! # audio-fanout
//!
//! Play whatever the computer is playing on several output devices at once.
//!
//! `audio-fanout` captures the system mix from the default render endpoint
//! (loopback) and re-renders it, unmodified, to two or more playback devices
//! simultaneously: speakers and headphones, or two Bluetooth headsets.
//!
//! ## Quick Start
//!
//! ```no_run
//! use audio_fanout::{list_render_devices, Router};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! for device in list_render_devices()? {
//!     println!("{}{}", device.name, if device.is_default { " (default)" } else { "" });
//! }
//!
//! let router = Router::builder(["Speakers (Realtek)", "Headphones (USB)"])
//!     .on_event(|e| tracing::warn!(?e, "router event"))
//!     .build()?;
//!
//! let report = router.start()?;
//! println!("playing on {} devices", report.started_count);
//!
//! // ... later
//! router.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Capture thread**: the loopback callback copies each block into every
//!   sink buffer and never blocks on playback
//! - **Sink buffers**: one lock-free SPSC queue per device absorbs clock
//!   drift; a full buffer drops new audio for that device only
//! - **Playback threads**: each device pulls from its own buffer and plays
//!   silence when it runs dry
//!
//! A slow or failing device never stalls capture or the other devices.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::missing_panics_doc)]

mod builder;
mod config;
mod device;
mod error;
mod event;
mod format;
mod pipeline;
mod router;
mod session;
pub mod settings;
pub mod sink;
pub mod source;
mod stream_thread;

pub use builder::RouterBuilder;
pub use config::{RouterConfig, RouterOptions, MIN_DEVICES};
pub use device::{
    default_render_device, list_render_devices, open_render_device, DeviceId, DeviceInfo,
};
pub use error::{RouterError, SettingsError};
pub use event::{event_callback, event_channel, EventCallback, RouterEvent};
pub use format::{AudioFormat, SampleFormat};
pub use pipeline::{sink_buffer, RouterState, SinkReader, SinkWriter, WriteOutcome};
pub use router::Router;
pub use session::{RouterStats, SkippedDevice, StartReport};
pub use settings::{JsonSettingsStore, Settings, SettingsStore};
pub use sink::{CpalPlayback, MockPlayback, OutputSink, PlaybackBackend, PlaybackStream};
pub use source::{CaptureSource, LoopbackCapture, MockCapture, MockCaptureHandle};
