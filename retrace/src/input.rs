//! Synthetic input.
//!
//! [`InputDriver`] is the low-level seam (one OS event per call); [`InputSynthesizer`]
//! builds the playback primitives on top of it and applies the configured settle delays.

use crate::config::EngineConfig;
use crate::errors::InputError;
use crate::keys::{char_key, key_from_name};
use crate::step::Point;
use rdev::{Button, EventType, Key};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, instrument};

/// Moves taken per second of drag.
const DRAG_STEPS_PER_SECOND: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn to_rdev(self) -> Button {
        match self {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }
}

/// One OS-level input event per call.
pub trait InputDriver: Send + Sync {
    fn move_to(&self, point: Point) -> Result<(), InputError>;
    fn press(&self, button: MouseButton) -> Result<(), InputError>;
    fn release(&self, button: MouseButton) -> Result<(), InputError>;
    /// Vertical wheel; positive scrolls up.
    fn wheel(&self, delta: i64) -> Result<(), InputError>;
    fn key_down(&self, key: Key) -> Result<(), InputError>;
    fn key_up(&self, key: Key) -> Result<(), InputError>;
}

/// Driver backed by `rdev::simulate`.
#[derive(Debug, Clone)]
pub struct RdevDriver {
    /// Pause after every event so the OS keeps them in order.
    event_gap: Duration,
}

impl Default for RdevDriver {
    fn default() -> Self {
        Self {
            event_gap: Duration::from_millis(20),
        }
    }
}

impl RdevDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, event: EventType) -> Result<(), InputError> {
        rdev::simulate(&event).map_err(|e| InputError::Simulate(format!("{event:?}: {e:?}")))?;
        if !self.event_gap.is_zero() {
            thread::sleep(self.event_gap);
        }
        Ok(())
    }
}

impl InputDriver for RdevDriver {
    fn move_to(&self, point: Point) -> Result<(), InputError> {
        self.send(EventType::MouseMove {
            x: point.x as f64,
            y: point.y as f64,
        })
    }

    fn press(&self, button: MouseButton) -> Result<(), InputError> {
        self.send(EventType::ButtonPress(button.to_rdev()))
    }

    fn release(&self, button: MouseButton) -> Result<(), InputError> {
        self.send(EventType::ButtonRelease(button.to_rdev()))
    }

    fn wheel(&self, delta: i64) -> Result<(), InputError> {
        self.send(EventType::Wheel {
            delta_x: 0,
            delta_y: delta,
        })
    }

    fn key_down(&self, key: Key) -> Result<(), InputError> {
        self.send(EventType::KeyPress(key))
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        self.send(EventType::KeyRelease(key))
    }
}

/// Playback-level input primitives with settle delays.
#[derive(Clone)]
pub struct InputSynthesizer {
    driver: Arc<dyn InputDriver>,
    click_interval: Duration,
    move_interval: Duration,
    scroll_interval: Duration,
}

impl InputSynthesizer {
    pub fn new(driver: Arc<dyn InputDriver>, config: &EngineConfig) -> Self {
        Self {
            driver,
            click_interval: config.click_interval(),
            move_interval: config.move_interval(),
            scroll_interval: config.scroll_interval(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn click(&self, point: Point) -> Result<(), InputError> {
        self.driver.move_to(point)?;
        self.driver.press(MouseButton::Left)?;
        self.driver.release(MouseButton::Left)?;
        settle(self.click_interval);
        Ok(())
    }

    pub fn move_to(&self, point: Point) -> Result<(), InputError> {
        self.driver.move_to(point)?;
        settle(self.move_interval);
        Ok(())
    }

    pub fn mouse_down(&self, point: Point) -> Result<(), InputError> {
        self.driver.move_to(point)?;
        self.driver.press(MouseButton::Left)
    }

    pub fn mouse_up(&self, point: Point) -> Result<(), InputError> {
        self.driver.move_to(point)?;
        self.driver.release(MouseButton::Left)
    }

    pub fn scroll(&self, point: Point, delta: i64) -> Result<(), InputError> {
        self.driver.move_to(point)?;
        self.driver.wheel(delta)?;
        settle(self.scroll_interval);
        Ok(())
    }

    /// Types `text`. A symbolic key name (`enter`, `Key.f5`, `Escape`) presses that key;
    /// anything else is typed character by character.
    #[instrument(level = "debug", skip(self))]
    pub fn type_text(&self, text: &str) -> Result<(), InputError> {
        if let Some(key) = key_from_name(text) {
            self.tap(key)?;
        } else {
            for c in text.chars() {
                let (key, shifted) =
                    char_key(c).ok_or_else(|| InputError::UnmappedKey(c.to_string()))?;
                if shifted {
                    self.driver.key_down(Key::ShiftLeft)?;
                }
                let tapped = self.tap(key);
                if shifted {
                    self.driver.key_up(Key::ShiftLeft)?;
                }
                tapped?;
            }
        }
        settle(self.click_interval);
        Ok(())
    }

    /// Presses at `start`, moves to `end` over `duration`, releases.
    #[instrument(level = "debug", skip(self))]
    pub fn drag(&self, start: Point, end: Point, duration: Duration) -> Result<(), InputError> {
        self.mouse_down(start)?;
        let steps = ((duration.as_secs_f64() * DRAG_STEPS_PER_SECOND).round() as u32).max(1);
        let pause = duration / steps;
        debug!("Dragging {} -> {} in {} moves", start, end, steps);
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            let x = start.x as f64 + (end.x as f64 - start.x as f64) * t;
            let y = start.y as f64 + (end.y as f64 - start.y as f64) * t;
            self.driver.move_to(Point::new(x.round() as i32, y.round() as i32))?;
            settle(pause);
        }
        self.driver.release(MouseButton::Left)
    }

    fn tap(&self, key: Key) -> Result<(), InputError> {
        self.driver.key_down(key)?;
        self.driver.key_up(key)
    }
}

fn settle(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl Recording {
        fn push(&self, s: String) -> Result<(), InputError> {
            self.0.lock().unwrap().push(s);
            Ok(())
        }
    }

    impl InputDriver for Recording {
        fn move_to(&self, p: Point) -> Result<(), InputError> {
            self.push(format!("move {} {}", p.x, p.y))
        }
        fn press(&self, b: MouseButton) -> Result<(), InputError> {
            self.push(format!("press {b:?}"))
        }
        fn release(&self, b: MouseButton) -> Result<(), InputError> {
            self.push(format!("release {b:?}"))
        }
        fn wheel(&self, d: i64) -> Result<(), InputError> {
            self.push(format!("wheel {d}"))
        }
        fn key_down(&self, k: Key) -> Result<(), InputError> {
            self.push(format!("down {k:?}"))
        }
        fn key_up(&self, k: Key) -> Result<(), InputError> {
            self.push(format!("up {k:?}"))
        }
    }

    fn synth() -> (Arc<Recording>, InputSynthesizer) {
        let driver = Arc::new(Recording::default());
        let synth = InputSynthesizer::new(driver.clone(), &EngineConfig::without_delays());
        (driver, synth)
    }

    #[test]
    fn test_type_symbolic_and_shifted() {
        let (driver, synth) = synth();
        synth.type_text("Key.enter").unwrap();
        synth.type_text("A").unwrap();
        let log = driver.0.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "down Return",
                "up Return",
                "down ShiftLeft",
                "down KeyA",
                "up KeyA",
                "up ShiftLeft"
            ]
        );
    }

    #[test]
    fn test_unmapped_character() {
        let (_, synth) = synth();
        assert!(matches!(synth.type_text("ü"), Err(InputError::UnmappedKey(_))));
    }

    #[test]
    fn test_drag_ends_on_target() {
        let (driver, synth) = synth();
        synth
            .drag(Point::new(0, 0), Point::new(100, 50), Duration::from_millis(100))
            .unwrap();
        let log = driver.0.lock().unwrap().clone();
        assert_eq!(log.first().unwrap(), "move 0 0");
        assert_eq!(log[1], "press Left");
        assert_eq!(log[log.len() - 2], "move 100 50");
        assert_eq!(log.last().unwrap(), "release Left");
        // 0.1 s at 50 moves per second
        assert_eq!(log.iter().filter(|l| l.starts_with("move")).count(), 1 + 5);
    }
}
