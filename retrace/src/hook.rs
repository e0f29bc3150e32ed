//! Process-wide OS input hook.
//!
//! `rdev::listen` can only be started once per process and never returns, so a single
//! listener thread is shared: it normalizes raw events into [`HookEvent`]s and fans them
//! out to every subscriber. Subscribers leave by dropping their receiver.

use crate::errors::HookError;
use crate::input::MouseButton;
use crate::step::Point;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use rdev::{Button, Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info};

/// How long `start` waits for the listener to report an immediate failure.
const STARTUP_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    ButtonPress { button: MouseButton, position: Point },
    ButtonRelease { button: MouseButton, position: Point },
    Move { position: Point },
    Wheel { position: Point, delta_x: i64, delta_y: i64 },
    /// `text` is the printable character the key produced, if any.
    KeyPress { key: Key, text: Option<String> },
    KeyRelease { key: Key },
}

/// A [`HookEvent`] stamped with the time the OS reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub event: HookEvent,
    /// Fractional epoch seconds, the unit of `Step::time`.
    pub time: f64,
}

/// Fractional epoch seconds with microsecond resolution.
pub fn epoch_seconds(at: SystemTime) -> f64 {
    DateTime::<Utc>::from(at).timestamp_micros() as f64 / 1_000_000.0
}

#[derive(Clone, Default)]
pub struct InputHook {
    subscribers: Arc<Mutex<Vec<Sender<TimedEvent>>>>,
    started: Arc<AtomicBool>,
}

impl InputHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// New receiver for every event published from now on.
    pub fn subscribe(&self) -> Receiver<TimedEvent> {
        let (tx, rx) = channel::unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Delivers `event`, stamped with the current time, to all live subscribers.
    pub fn publish(&self, event: HookEvent) {
        self.publish_at(event, SystemTime::now());
    }

    /// Delivers `event` stamped with `at` and forgets subscribers that hung up.
    pub fn publish_at(&self, event: HookEvent, at: SystemTime) {
        let timed = TimedEvent {
            event,
            time: epoch_seconds(at),
        };
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(timed.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Starts the OS listener thread. Later calls are no-ops.
    pub fn start(&self) -> Result<(), HookError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (err_tx, err_rx) = channel::bounded::<String>(1);
        let hook = self.clone();
        thread::Builder::new()
            .name("retrace-input-hook".to_string())
            .spawn(move || {
                let mut last_position = Point::default();
                info!("Starting OS input listener");
                let result = rdev::listen(move |event: Event| {
                    if let Some(normalized) = normalize(&event, &mut last_position) {
                        hook.publish_at(normalized, event.time);
                    }
                });
                if let Err(e) = result {
                    error!("Input listener failed: {:?}", e);
                    let _ = err_tx.send(format!("{e:?}"));
                }
            })
            .map_err(|e| HookError::Listen(format!("failed to spawn listener thread: {e}")))?;

        match err_rx.recv_timeout(STARTUP_GRACE) {
            Ok(message) => {
                self.started.store(false, Ordering::SeqCst);
                Err(HookError::Listen(message))
            }
            Err(_) => {
                debug!("Input listener running");
                Ok(())
            }
        }
    }
}

fn normalize(event: &Event, last_position: &mut Point) -> Option<HookEvent> {
    match event.event_type {
        EventType::MouseMove { x, y } => {
            *last_position = Point::new(x.round() as i32, y.round() as i32);
            Some(HookEvent::Move {
                position: *last_position,
            })
        }
        EventType::ButtonPress(button) => Some(HookEvent::ButtonPress {
            button: from_rdev(button)?,
            position: *last_position,
        }),
        EventType::ButtonRelease(button) => Some(HookEvent::ButtonRelease {
            button: from_rdev(button)?,
            position: *last_position,
        }),
        EventType::Wheel { delta_x, delta_y } => Some(HookEvent::Wheel {
            position: *last_position,
            delta_x,
            delta_y,
        }),
        EventType::KeyPress(key) => Some(HookEvent::KeyPress {
            key,
            text: printable(event.name.as_deref()),
        }),
        EventType::KeyRelease(key) => Some(HookEvent::KeyRelease { key }),
    }
}

fn from_rdev(button: Button) -> Option<MouseButton> {
    match button {
        Button::Left => Some(MouseButton::Left),
        Button::Right => Some(MouseButton::Right),
        Button::Middle => Some(MouseButton::Middle),
        Button::Unknown(_) => None,
    }
}

/// Single visible character, or `None` for control output such as `"\r"`.
fn printable(name: Option<&str>) -> Option<String> {
    let name = name?;
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() || c.is_control() {
        return None;
    }
    Some(c.to_string())
}
