//! Playback device identification and the render-device directory.
//!
//! The router only ever consumes [`DeviceId`] values. Listing devices and
//! resolving an id to a playable handle lives here so that UIs and the CLI
//! share one notion of "which devices exist".

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::RouterError;

/// Opaque, stable identifier for a playback endpoint.
///
/// `DeviceId` uses `Arc<str>` internally, so cloning is a pointer copy. It is
/// not validated on construction; an id that names no device only fails when
/// the router tries to open it.
///
/// With the cpal backend the id is the device name as reported by the host.
///
/// # Example
///
/// ```
/// use audio_fanout::DeviceId;
///
/// let speakers = DeviceId::new("Speakers");
/// let hdmi: DeviceId = "HDMI Output".into();
///
/// assert_ne!(speakers, hdmi);
/// assert_eq!(speakers, DeviceId::new("Speakers"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Creates a new device ID from a string.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&DeviceId> for DeviceId {
    fn from(id: &DeviceId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for DeviceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DeviceId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// A render (playback) endpoint as seen by the device directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Identifier to pass to the router.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Whether this is the system's current default output.
    pub is_default: bool,
}

/// Lists all render devices on the default host.
///
/// # Errors
///
/// Returns `Backend` if the audio host cannot enumerate output devices.
pub fn list_render_devices() -> Result<Vec<DeviceInfo>, RouterError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| RouterError::Backend(e.to_string()))?;

    Ok(devices
        .filter_map(|d| d.name().ok())
        .map(|name| DeviceInfo {
            id: DeviceId::new(name.as_str()),
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect())
}

/// Returns the system's default render device, if any.
pub fn default_render_device() -> Option<DeviceInfo> {
    let name = cpal::default_host().default_output_device()?.name().ok()?;
    Some(DeviceInfo {
        id: DeviceId::new(name.as_str()),
        name,
        is_default: true,
    })
}

/// Resolves a [`DeviceId`] to a cpal output device.
///
/// # Errors
///
/// Returns `DeviceNotFound` if no output device carries this id, or
/// `Backend` if enumeration itself fails.
pub fn open_render_device(id: &DeviceId) -> Result<cpal::Device, RouterError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| RouterError::Backend(e.to_string()))?;

    for device in devices {
        if let Ok(name) = device.name() {
            if name == id.as_str() {
                return Ok(device);
            }
        }
    }

    Err(RouterError::DeviceNotFound {
        device_id: id.clone(),
    })
}
