use crate::hook::{HookEvent, InputHook, TimedEvent};
use crate::playback::PlaybackHandle;
use crossbeam::channel::RecvTimeoutError;
use rdev::Key;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub const STOP_KEY: Key = Key::Escape;
pub const PAUSE_KEY: Key = Key::F8;

/// Global playback hotkeys: Escape stops, F8 toggles pause.
///
/// Listens while the guard is alive; dropping it detaches from the hook.
pub struct PlaybackHotkeys {
    should_close: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PlaybackHotkeys {
    pub fn attach(hook: &InputHook, playback: PlaybackHandle) -> Self {
        let events = hook.subscribe();
        let should_close = Arc::new(AtomicBool::new(false));
        let closing = should_close.clone();

        let spawned = thread::Builder::new()
            .name("retrace-hotkeys".to_string())
            .spawn(move || {
                while !closing.load(Ordering::Relaxed) {
                    match events.recv_timeout(Duration::from_millis(100)) {
                        Ok(TimedEvent {
                            event: HookEvent::KeyPress { key, .. },
                            ..
                        }) if key == STOP_KEY => {
                            info!("Stop hotkey pressed");
                            playback.stop();
                        }
                        Ok(TimedEvent {
                            event: HookEvent::KeyPress { key, .. },
                            ..
                        }) if key == PAUSE_KEY => {
                            let paused = playback.toggle_pause();
                            info!("Pause hotkey pressed, paused = {}", paused);
                        }
                        Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

        Self {
            should_close,
            handle: listener(spawned),
        }
    }

    /// False when the listener thread could not be started.
    pub fn is_listening(&self) -> bool {
        self.handle.is_some()
    }

    /// Detaches and waits for the listener thread.
    pub fn detach(self) {
        drop(self);
    }
}

fn listener(spawned: std::io::Result<thread::JoinHandle<()>>) -> Option<thread::JoinHandle<()>> {
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Playback hotkeys unavailable, listener thread failed to start: {}", e);
            None
        }
    }
}

impl Drop for PlaybackHotkeys {
    fn drop(&mut self) {
        self.should_close.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
