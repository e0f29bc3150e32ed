//! Engine configuration.
//!
//! The configuration is read-only to the engine. It is usually stored as a flat JSON
//! object (one key per option); absent keys take their defaults and keys holding a
//! value of the wrong type are ignored with a warning instead of failing the load.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Tunables for locating, input pacing, playback and recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Settle delay after click and type actions (seconds).
    pub click_interval: f64,
    /// Upper bound on the time spent locating one target (seconds).
    pub timeout: f64,
    /// Minimum template match score in `[0, 1]`.
    pub image_confidence: f32,
    pub image_retry_count: u32,
    /// Pause between failed template searches (seconds).
    pub image_retry_interval: f64,
    pub enable_fallback: bool,
    /// Side of the square template captured around a recorded click (pixels).
    pub image_region_size: u32,
    pub ocr_enabled: bool,
    pub move_interval: f64,
    pub scroll_interval: f64,
    pub drag_duration: f64,
    pub pause_poll_interval: f64,
    /// Recorded gaps at or above this many seconds are not reproduced.
    pub max_step_gap: f64,
    pub countdown_seconds: u32,
    /// Pointer travel below this many pixels between press and release is a click.
    pub click_distance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            click_interval: 0.5,
            timeout: 10.0,
            image_confidence: 0.8,
            image_retry_count: 3,
            image_retry_interval: 0.3,
            enable_fallback: true,
            image_region_size: 100,
            ocr_enabled: true,
            move_interval: 0.1,
            scroll_interval: 0.1,
            drag_duration: 0.5,
            pause_poll_interval: 0.1,
            max_step_gap: 5.0,
            countdown_seconds: 2,
            click_distance: 10.0,
        }
    }
}

/// Overwrites `$field` from `$map[$key]` when present and well-typed.
macro_rules! apply_key {
    ($map:expr, $config:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(raw) = $map.get(stringify!($field)) {
                match serde_json::from_value(raw.clone()) {
                    Ok(value) => $config.$field = value,
                    Err(e) => warn!(
                        "Ignoring config key `{}` = {}: {}",
                        stringify!($field),
                        raw,
                        e
                    ),
                }
            }
        )+
    };
}

impl EngineConfig {
    /// Builds a configuration from a key/value map, defaulting everything absent.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut config = Self::default();
        apply_key!(
            map,
            config,
            click_interval,
            timeout,
            image_confidence,
            image_retry_count,
            image_retry_interval,
            enable_fallback,
            image_region_size,
            ocr_enabled,
            move_interval,
            scroll_interval,
            drag_duration,
            pause_poll_interval,
            max_step_gap,
            countdown_seconds,
            click_distance,
        );
        config.sanitize();
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => Ok(Self::from_map(&map)),
            other => Err(ConfigError::NotAnObject(other.to_string())),
        }
    }

    /// Loads a JSON config file. A missing file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn sanitize(&mut self) {
        let defaults = Self::default();
        if !(0.0..=1.0).contains(&self.image_confidence) {
            warn!(
                "image_confidence {} outside [0, 1], using {}",
                self.image_confidence, defaults.image_confidence
            );
            self.image_confidence = defaults.image_confidence;
        }
        if self.image_retry_count == 0 {
            warn!("image_retry_count must be at least 1");
            self.image_retry_count = 1;
        }
        if self.image_region_size == 0 {
            self.image_region_size = defaults.image_region_size;
        }
        if !self.click_distance.is_finite() || self.click_distance < 0.0 {
            warn!(
                "click_distance {} must be a non-negative number of pixels, using {}",
                self.click_distance, defaults.click_distance
            );
            self.click_distance = defaults.click_distance;
        }
        for (name, seconds, default) in [
            ("click_interval", &mut self.click_interval, defaults.click_interval),
            ("timeout", &mut self.timeout, defaults.timeout),
            (
                "image_retry_interval",
                &mut self.image_retry_interval,
                defaults.image_retry_interval,
            ),
            ("move_interval", &mut self.move_interval, defaults.move_interval),
            ("scroll_interval", &mut self.scroll_interval, defaults.scroll_interval),
            ("drag_duration", &mut self.drag_duration, defaults.drag_duration),
            (
                "pause_poll_interval",
                &mut self.pause_poll_interval,
                defaults.pause_poll_interval,
            ),
            ("max_step_gap", &mut self.max_step_gap, defaults.max_step_gap),
        ] {
            if !seconds.is_finite() || *seconds < 0.0 {
                warn!("{} must be a non-negative number of seconds", name);
                *seconds = default;
            }
        }
    }

    pub fn click_interval(&self) -> Duration {
        secs(self.click_interval)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout)
    }

    pub fn image_retry_interval(&self) -> Duration {
        secs(self.image_retry_interval)
    }

    pub fn move_interval(&self) -> Duration {
        secs(self.move_interval)
    }

    pub fn scroll_interval(&self) -> Duration {
        secs(self.scroll_interval)
    }

    pub fn drag_duration(&self) -> Duration {
        secs(self.drag_duration)
    }

    pub fn pause_poll_interval(&self) -> Duration {
        secs(self.pause_poll_interval)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_seconds as u64)
    }

    /// Configuration with every delay removed. Handy for tests and dry runs.
    pub fn without_delays() -> Self {
        Self {
            click_interval: 0.0,
            image_retry_interval: 0.0,
            move_interval: 0.0,
            scroll_interval: 0.0,
            drag_duration: 0.0,
            pause_poll_interval: 0.01,
            countdown_seconds: 0,
            ..Self::default()
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}
