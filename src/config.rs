//! Router configuration types.

use std::time::Duration;

use crate::{DeviceId, RouterError};

/// Minimum number of distinct destinations a router accepts.
pub const MIN_DEVICES: usize = 2;

/// The ordered set of playback devices a router fans out to.
///
/// Duplicates are removed, keeping the first occurrence. A config with fewer
/// than [`MIN_DEVICES`] distinct ids is rejected.
///
/// # Example
///
/// ```
/// use audio_fanout::RouterConfig;
///
/// let config = RouterConfig::new(["Speakers", "Headphones", "Speakers"]).unwrap();
/// assert_eq!(config.len(), 2);
///
/// assert!(RouterConfig::new(["Speakers"]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    device_ids: Vec<DeviceId>,
}

impl RouterConfig {
    /// Builds a config from device ids, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than two distinct ids remain.
    pub fn new<I, D>(device_ids: I) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        let mut unique: Vec<DeviceId> = Vec::new();
        for id in device_ids {
            let id = id.into();
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let config = Self { device_ids: unique };
        config.validate()?;
        Ok(config)
    }

    /// Checks the distinct-device invariant.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if fewer than two distinct ids are present.
    pub fn validate(&self) -> Result<(), RouterError> {
        if self.device_ids.len() < MIN_DEVICES {
            return Err(RouterError::invalid_config(format!(
                "at least {MIN_DEVICES} distinct devices required, got {}",
                self.device_ids.len()
            )));
        }
        Ok(())
    }

    /// The target devices, in the order they were given.
    pub fn device_ids(&self) -> &[DeviceId] {
        &self.device_ids
    }

    /// Number of distinct target devices.
    pub fn len(&self) -> usize {
        self.device_ids.len()
    }

    /// Always `false` for a validated config.
    pub fn is_empty(&self) -> bool {
        self.device_ids.is_empty()
    }
}

/// Tuning knobs for a router.
///
/// Use [`RouterOptions::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use audio_fanout::RouterOptions;
/// use std::time::Duration;
///
/// let options = RouterOptions {
///     buffer_duration: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    /// Capacity of each sink buffer, expressed as audio duration.
    ///
    /// When a buffer is full, newly captured blocks are dropped for that
    /// device only.
    /// Default: 2 seconds
    pub buffer_duration: Duration,

    /// Minimum spacing between `OverflowDropped` events for one device.
    ///
    /// Drops in between are aggregated into the next report.
    /// Default: 1 second
    pub overflow_report_interval: Duration,

    /// Requested playback buffer size, passed to the backend as a hint.
    ///
    /// `None` lets the backend choose.
    /// Default: 100ms
    pub output_latency: Option<Duration>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            buffer_duration: Duration::from_secs(2),
            overflow_report_interval: Duration::from_secs(1),
            output_latency: Some(Duration::from_millis(100)),
        }
    }
}
