mod locator_tests;

use crate::errors::{InputError, OcrError, ScreenError};
use crate::input::{InputDriver, MouseButton};
use crate::ocr::{OcrEngine, TextBox};
use crate::screen::{Screen, Screenshot};
use crate::step::Point;
use image::{Rgba, RgbaImage};
use rdev::Key;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_test_writer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}

/// Deterministic high-frequency texture; different seeds share no patches.
pub fn noise(width: u32, height: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77) ^ seed.wrapping_mul(0x27D4_EB2F);
        h ^= h >> 15;
        h = h.wrapping_mul(0xC2B2_AE3D);
        h ^= h >> 13;
        let v = (h & 0xFF) as u8;
        Rgba([v, v.wrapping_mul(3), 255 - v, 255])
    })
}

/// Screen returning a fixed frame, or failing on demand.
pub struct MockScreen {
    frame: RgbaImage,
    origin: Point,
    pub fail: AtomicBool,
    pub captures: AtomicUsize,
}

impl MockScreen {
    pub fn new(frame: RgbaImage, origin: Point) -> Self {
        Self {
            frame,
            origin,
            fail: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
        }
    }

    pub fn blank() -> Self {
        Self::new(RgbaImage::from_pixel(64, 48, Rgba([30, 30, 30, 255])), Point::new(0, 0))
    }

    pub fn failing() -> Self {
        let screen = Self::blank();
        screen.fail.store(true, Ordering::SeqCst);
        screen
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Screen for MockScreen {
    fn capture(&self) -> Result<Screenshot, ScreenError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ScreenError::PlatformError("display unavailable".to_string()));
        }
        Ok(Screenshot::new(self.frame.clone(), self.origin))
    }
}

/// Driver that logs every primitive as a short string.
#[derive(Default)]
pub struct MockDriver {
    log: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl MockDriver {
    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn push(&self, entry: String) -> Result<(), InputError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(InputError::Simulate(entry));
        }
        self.log.lock().unwrap().push(entry);
        Ok(())
    }
}

impl InputDriver for MockDriver {
    fn move_to(&self, point: Point) -> Result<(), InputError> {
        self.push(format!("move {} {}", point.x, point.y))
    }

    fn press(&self, button: MouseButton) -> Result<(), InputError> {
        self.push(format!("press {button:?}"))
    }

    fn release(&self, button: MouseButton) -> Result<(), InputError> {
        self.push(format!("release {button:?}"))
    }

    fn wheel(&self, delta: i64) -> Result<(), InputError> {
        self.push(format!("wheel {delta}"))
    }

    fn key_down(&self, key: Key) -> Result<(), InputError> {
        self.push(format!("down {key:?}"))
    }

    fn key_up(&self, key: Key) -> Result<(), InputError> {
        self.push(format!("up {key:?}"))
    }
}

pub struct MockOcr {
    pub boxes: Vec<TextBox>,
}

impl MockOcr {
    pub fn with_words(words: &[(&str, i32, i32, i32, i32)]) -> Self {
        Self {
            boxes: words
                .iter()
                .map(|&(text, left, top, width, height)| TextBox {
                    text: text.to_string(),
                    left,
                    top,
                    width,
                    height,
                    confidence: 90.0,
                })
                .collect(),
        }
    }
}

impl OcrEngine for MockOcr {
    fn recognize(&self, _image: &RgbaImage) -> Result<Vec<TextBox>, OcrError> {
        Ok(self.boxes.clone())
    }
}
