//! Dedicated thread owning one cpal stream.
//!
//! `cpal::Stream` is `!Send`, so a stream cannot live inside the router.
//! Each stream is built, played, and dropped on its own thread; the owner
//! keeps a [`StreamThread`] handle that can start playback and shut the
//! stream down.

use std::cell::Cell;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cpal::traits::StreamTrait;

thread_local! {
    static IN_AUDIO_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Runs `f` with the current thread marked as an audio callback.
pub(crate) fn in_audio_callback<R>(f: impl FnOnce() -> R) -> R {
    struct Reset(bool);
    impl Drop for Reset {
        fn drop(&mut self) {
            IN_AUDIO_CALLBACK.with(|flag| flag.set(self.0));
        }
    }

    let _reset = Reset(IN_AUDIO_CALLBACK.with(|flag| flag.replace(true)));
    f()
}

/// Returns `true` when called from inside an audio callback.
///
/// Joining a stream thread from here would deadlock: dropping the stream
/// waits for the callback that is currently running.
pub(crate) fn is_audio_callback() -> bool {
    IN_AUDIO_CALLBACK.with(Cell::get)
}

/// Wraps a device error callback for cpal.
///
/// Every stream error is reported as fatal: on WASAPI the stream thread
/// exits right after its error callback returns, whatever the error kind.
pub(crate) fn fatal_error_callback(
    mut on_error: Box<dyn FnMut(String) + Send + 'static>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| in_audio_callback(|| on_error(err.to_string()))
}

enum Command {
    Play(mpsc::Sender<Result<(), String>>),
    Shutdown,
}

/// Handle to a thread that owns a built cpal stream.
pub(crate) struct StreamThread {
    name: String,
    commands: Option<mpsc::Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Spawns a thread, builds the stream on it, and waits for the result.
    ///
    /// The stream is built but not playing when this returns.
    pub fn spawn<F>(name: impl Into<String>, build: F) -> Result<Self, String>
    where
        F: FnOnce() -> Result<cpal::Stream, String> + Send + 'static,
    {
        let name = name.into();
        let (init_tx, init_rx) = mpsc::channel::<Result<(), String>>();
        let (command_tx, command_rx) = mpsc::channel::<Command>();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));

                // Closed sender also ends the loop
                while let Ok(command) = command_rx.recv() {
                    match command {
                        Command::Play(ack) => {
                            let _ = ack.send(stream.play().map_err(|e| e.to_string()));
                        }
                        Command::Shutdown => break,
                    }
                }

                if let Err(e) = stream.pause() {
                    tracing::debug!("pause before drop failed: {e}");
                }
            })
            .map_err(|e| format!("failed to spawn stream thread: {e}"))?;

        match init_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                name,
                commands: Some(command_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(format!("stream thread '{name}' exited during initialization"))
            }
        }
    }

    /// Starts the stream and waits for the backend to accept.
    pub fn play(&self) -> Result<(), String> {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| format!("stream thread '{}' already stopped", self.name))?;

        let (ack_tx, ack_rx) = mpsc::channel();
        commands
            .send(Command::Play(ack_tx))
            .map_err(|_| format!("stream thread '{}' is gone", self.name))?;
        ack_rx
            .recv()
            .map_err(|_| format!("stream thread '{}' is gone", self.name))?
    }

    /// Stops the stream and releases the device. Idempotent.
    ///
    /// From inside an audio callback the thread is signalled but not joined.
    pub fn stop(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Shutdown);
        }

        let Some(handle) = self.handle.take() else {
            return;
        };
        if is_audio_callback() {
            tracing::debug!(thread = %self.name, "stop requested from audio callback; detaching");
            return;
        }
        if handle.join().is_err() {
            tracing::error!(thread = %self.name, "stream thread panicked");
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}
