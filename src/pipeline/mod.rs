//! Audio pipeline components.
//!
//! The pipeline connects the capture callback to every output:
//!
//! ```text
//! Capture callback → Distribution → SinkBuffer (per device) → Playback callback
//! ```
//!
//! - **Distribution**: copies each captured block into every live sink buffer
//! - **SinkBuffer**: lock-free SPSC queue absorbing rate drift per device
//! - **Overflow**: per-device drop accounting with rate-limited reporting
//!
//! Neither callback ever blocks on the other; a slow device only loses its
//! own audio.

mod distribution;
mod overflow;
mod sink_buffer;

pub use distribution::RouterState;
pub(crate) use distribution::{Distribution, SinkEntry};
pub use sink_buffer::{sink_buffer, SinkReader, SinkWriter, WriteOutcome};
