//! Builder pattern for [`Router`].

use std::sync::Arc;

use crate::sink::{CpalPlayback, PlaybackBackend};
use crate::source::{CaptureSource, LoopbackCapture};
use crate::{
    event_callback, DeviceId, EventCallback, Router, RouterConfig, RouterError, RouterEvent,
    RouterOptions,
};

/// Configures a [`Router`] before construction.
///
/// By default the router captures the system mix with [`LoopbackCapture`]
/// and plays through [`CpalPlayback`]. Tests swap both for mocks.
///
/// # Example
///
/// ```
/// use audio_fanout::sink::MockPlayback;
/// use audio_fanout::source::MockCapture;
/// use audio_fanout::Router;
///
/// let (capture, _handle) = MockCapture::stereo_f32();
/// let router = Router::builder(["Speakers", "Headphones"])
///     .capture(capture)
///     .playback(MockPlayback::new())
///     .on_event(|event| println!("{event:?}"))
///     .build()
///     .unwrap();
/// assert!(!router.is_running());
/// ```
pub struct RouterBuilder {
    device_ids: Vec<DeviceId>,
    capture: Option<Box<dyn CaptureSource>>,
    playback: Option<Arc<dyn PlaybackBackend>>,
    options: RouterOptions,
    event_callback: Option<EventCallback>,
}

impl RouterBuilder {
    /// Starts a builder for the given target devices.
    pub fn new<I, D>(device_ids: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        Self {
            device_ids: device_ids.into_iter().map(Into::into).collect(),
            capture: None,
            playback: None,
            options: RouterOptions::default(),
            event_callback: None,
        }
    }

    /// Sets the capture source.
    ///
    /// Default: [`LoopbackCapture`] on the default render endpoint.
    #[must_use]
    pub fn capture<C: CaptureSource + 'static>(mut self, capture: C) -> Self {
        self.capture = Some(Box::new(capture));
        self
    }

    /// Sets the playback backend.
    ///
    /// Default: [`CpalPlayback`] with the options' latency hint.
    #[must_use]
    pub fn playback<P: PlaybackBackend + 'static>(mut self, playback: P) -> Self {
        self.playback = Some(Arc::new(playback));
        self
    }

    /// Sets buffer and reporting options.
    #[must_use]
    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets a callback to receive runtime events.
    ///
    /// Events include overflow drops, mid-session device loss, and lifecycle
    /// changes.
    #[must_use]
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RouterEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Sets an already-built event callback, such as one from
    /// [`event_channel()`](crate::event_channel).
    #[must_use]
    pub fn event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Validates the device list and creates an idle router.
    ///
    /// No device is touched until [`Router::start()`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than two distinct devices were given.
    pub fn build(self) -> Result<Router, RouterError> {
        let config = RouterConfig::new(self.device_ids)?;
        let capture = self
            .capture
            .unwrap_or_else(|| Box::new(LoopbackCapture::new()));
        let playback = self
            .playback
            .unwrap_or_else(|| Arc::new(CpalPlayback::new(self.options.output_latency)));

        Ok(Router::from_parts(
            config,
            self.options,
            capture,
            playback,
            self.event_callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockPlayback;
    use crate::source::MockCapture;
    use std::time::Duration;

    #[test]
    fn test_builder_defaults() {
        let builder = RouterBuilder::new(["A", "B"]);
        assert_eq!(builder.device_ids.len(), 2);
        assert!(builder.capture.is_none());
        assert!(builder.playback.is_none());
        assert_eq!(builder.options, RouterOptions::default());
    }

    #[test]
    fn test_builder_rejects_single_device() {
        let result = RouterBuilder::new(["A"]).build();
        assert!(matches!(result, Err(RouterError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_rejects_duplicates_only() {
        let result = RouterBuilder::new(["A", "A"]).build();
        assert!(matches!(result, Err(RouterError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_with_mocks() {
        let (capture, _handle) = MockCapture::stereo_f32();
        let options = RouterOptions {
            buffer_duration: Duration::from_millis(500),
            ..RouterOptions::default()
        };

        let router = RouterBuilder::new(["A", "B", "C"])
            .capture(capture)
            .playback(MockPlayback::new())
            .options(options)
            .build()
            .unwrap();

        assert_eq!(router.config().len(), 3);
        assert!(!router.is_running());
    }
}
