//! Error types for audio-fanout.
//!
//! Errors are split into two categories:
//! - **Synchronous errors** ([`RouterError`]): returned from construction and `start()`
//! - **Runtime events**: overflow and mid-session device loss, surfaced via
//!   [`EventCallback`](crate::EventCallback)

use std::path::PathBuf;

use crate::DeviceId;

/// Errors returned by router construction, `start()` and the device directory.
///
/// Per-device open failures during `start()` do not abort the start; they are
/// collected as [`SkippedDevice`](crate::SkippedDevice) entries carrying a
/// `DeviceInitFailed` value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    /// Fewer than two distinct target devices.
    #[error("invalid router configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// The default render endpoint is missing or refuses loopback capture.
    #[error("capture endpoint unavailable: {reason}")]
    DeviceUnavailable {
        /// Why the endpoint could not be opened.
        reason: String,
    },

    /// No playback device carries the given id.
    #[error("device not found: {device_id}")]
    DeviceNotFound {
        /// The id that did not resolve.
        device_id: DeviceId,
    },

    /// A single output device could not be opened or started.
    #[error("device '{device_id}' failed to initialize: {cause}")]
    DeviceInitFailed {
        /// The device that failed.
        device_id: DeviceId,
        /// Underlying device error.
        cause: String,
    },

    /// Every requested output device failed to open.
    #[error("no output devices could be initialized ({attempted} attempted)")]
    NoSinksAvailable {
        /// How many devices were tried.
        attempted: usize,
    },

    /// The capture endpoint uses a sample encoding that cannot be passed through.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The offending format.
        format: String,
    },

    /// An error from the audio backend that fits no other category.
    #[error("audio backend error: {0}")]
    Backend(String),
}

impl RouterError {
    /// Creates a `DeviceInitFailed` error.
    pub fn device_init_failed(device_id: impl Into<DeviceId>, cause: impl ToString) -> Self {
        Self::DeviceInitFailed {
            device_id: device_id.into(),
            cause: cause.to_string(),
        }
    }

    /// Creates a `DeviceUnavailable` error.
    pub fn device_unavailable(reason: impl ToString) -> Self {
        Self::DeviceUnavailable {
            reason: reason.to_string(),
        }
    }

    /// Creates an `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Errors from the settings store.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings file error: {path}: {source}")]
    Io {
        /// Path to the settings file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file exists but is not valid JSON for [`Settings`](crate::Settings).
    #[error("malformed settings file: {path}: {source}")]
    Parse {
        /// Path to the settings file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// No per-user configuration directory could be determined.
    #[error("no configuration directory available on this system")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = RouterError::invalid_config("at least 2 devices required, got 1");
        assert_eq!(
            err.to_string(),
            "invalid router configuration: at least 2 devices required, got 1"
        );
    }

    #[test]
    fn test_device_init_failed_display() {
        let err = RouterError::device_init_failed("B", "device in use");
        assert_eq!(
            err.to_string(),
            "device 'B' failed to initialize: device in use"
        );
    }

    #[test]
    fn test_no_sinks_display() {
        let err = RouterError::NoSinksAvailable { attempted: 3 };
        assert!(err.to_string().contains("3 attempted"));
    }

    #[test]
    fn test_settings_io_error_includes_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SettingsError::Io {
            path: PathBuf::from("/tmp/config.json"),
            source: io_err,
        };
        assert!(err.to_string().contains("/tmp/config.json"));
    }
}
