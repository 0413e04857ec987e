//! Runtime events for monitoring router health.
//!
//! Events are the out-of-band path for everything that is not a synchronous
//! result of `start()`: buffer overflow, mid-session device loss, and
//! lifecycle diagnostics. Events are never emitted while the router holds its
//! distribution lock, so a handler may call [`Router::stop()`] directly.
//!
//! [`Router::stop()`]: crate::Router::stop

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::DeviceId;

/// Runtime events emitted by a [`Router`](crate::Router).
///
/// # Example
///
/// ```
/// use audio_fanout::RouterEvent;
///
/// fn handle_event(event: RouterEvent) {
///     match event {
///         RouterEvent::OverflowDropped { device_id, dropped_bytes, .. } => {
///             eprintln!("{device_id} is falling behind: dropped {dropped_bytes} bytes");
///         }
///         RouterEvent::FatalDeviceError { device_id: Some(id), cause } => {
///             eprintln!("lost output {id}: {cause}");
///         }
///         RouterEvent::FatalDeviceError { device_id: None, cause } => {
///             eprintln!("session is dead, stop the router: {cause}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// A sink buffer discarded captured data because its device fell behind.
    ///
    /// Reports are rate limited per device; the counts cover every drop
    /// since the previous report for that device.
    OverflowDropped {
        /// Device whose buffer overflowed.
        device_id: DeviceId,
        /// Blocks discarded since the last report.
        dropped_blocks: u64,
        /// Bytes discarded since the last report.
        dropped_bytes: u64,
    },

    /// A device failed while the router was running.
    ///
    /// `device_id` is `None` when the capture endpoint failed or the last
    /// live output was lost; the session is then dead and must be stopped by
    /// the caller. An output failure otherwise only removes that device; the
    /// other outputs keep playing.
    FatalDeviceError {
        /// Failed output device, or `None` when the whole session failed.
        device_id: Option<DeviceId>,
        /// Description of the failure.
        cause: String,
    },

    /// An output device was opened and is playing.
    SinkStarted {
        /// The device that started.
        device_id: DeviceId,
    },

    /// An output device could not be opened during `start()` and was skipped.
    SinkSkipped {
        /// The device that was skipped.
        device_id: DeviceId,
        /// Why it could not be opened.
        reason: String,
    },

    /// The router entered the running state.
    Started {
        /// Number of outputs playing.
        started_count: usize,
        /// Number of outputs skipped.
        skipped_count: usize,
    },

    /// The router returned to idle.
    Stopped,
}

/// Callback type for receiving runtime events.
///
/// Register one via [`RouterBuilder::on_event()`]. The callback runs on
/// whichever thread produced the event, which may be a real-time audio
/// thread: keep it short and non-blocking.
///
/// [`RouterBuilder::on_event()`]: crate::RouterBuilder::on_event
pub type EventCallback = Arc<dyn Fn(RouterEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use audio_fanout::{event_callback, RouterEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(RouterEvent::Stopped);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RouterEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Creates an [`EventCallback`] that forwards events into a tokio channel.
///
/// The callback never blocks: when the channel is full or closed, the event
/// is dropped and logged at debug level.
///
/// # Example
///
/// ```
/// use audio_fanout::{event_channel, RouterEvent};
///
/// let (callback, mut rx) = event_channel(16);
/// callback(RouterEvent::Stopped);
/// assert_eq!(rx.try_recv().unwrap(), RouterEvent::Stopped);
/// ```
pub fn event_channel(capacity: usize) -> (EventCallback, mpsc::Receiver<RouterEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    let callback = event_callback(move |event| {
        if let Err(e) = tx.try_send(event) {
            tracing::debug!("router event dropped: {e}");
        }
    });
    (callback, rx)
}

/// Sends an event to an optional callback.
pub(crate) fn emit(callback: Option<&EventCallback>, event: RouterEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_event_debug() {
        let event = RouterEvent::OverflowDropped {
            device_id: DeviceId::new("A"),
            dropped_blocks: 3,
            dropped_bytes: 12288,
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("OverflowDropped"));
        assert!(debug.contains("12288"));
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(RouterEvent::Stopped);
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_event_channel_delivers() {
        let (callback, mut rx) = event_channel(4);
        callback(RouterEvent::FatalDeviceError {
            device_id: None,
            cause: "endpoint removed".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            RouterEvent::FatalDeviceError { device_id: None, .. }
        ));
    }

    #[test]
    fn test_event_channel_full_does_not_block() {
        let (callback, mut rx) = event_channel(1);
        callback(RouterEvent::Stopped);
        callback(RouterEvent::Stopped);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_channel_closed_does_not_panic() {
        let (callback, rx) = event_channel(1);
        drop(rx);
        callback(RouterEvent::Stopped);
    }
}
