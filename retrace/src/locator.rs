use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::errors::LocateError;
use crate::matching::TemplateMatcher;
use crate::ocr::{find_text, OcrEngine};
use crate::screen::Screen;
use crate::step::{Locator, Point, Target};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub point: Point,
    /// Screen searches performed. Zero for coordinates and for failures detected
    /// before any search.
    pub attempts: u32,
    /// True when an image search gave up and the recorded coordinate was used.
    pub used_fallback: bool,
}

impl Resolution {
    fn direct(point: Point) -> Self {
        Self {
            point,
            attempts: 0,
            used_fallback: false,
        }
    }
}

/// Turns step locators into screen coordinates.
///
/// Coordinates pass through unchanged. Image locators are searched on fresh screen
/// captures with bounded retries, then fall back to the coordinate recorded with the
/// template if allowed. Text locators run OCR over one capture.
#[derive(Clone)]
pub struct LocatorResolver {
    config: EngineConfig,
    screen: Arc<dyn Screen>,
    ocr: Option<Arc<dyn OcrEngine>>,
    matcher: TemplateMatcher,
}

impl LocatorResolver {
    pub fn new(config: EngineConfig, screen: Arc<dyn Screen>) -> Self {
        Self {
            config,
            screen,
            ocr: None,
            matcher: TemplateMatcher::new(),
        }
    }

    /// Enables text locators.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_matcher(mut self, matcher: TemplateMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolve(&self, locator: &Locator) -> Result<Point, LocateError> {
        self.resolve_detailed(locator).map(|r| r.point)
    }

    #[instrument(level = "debug", skip(self, locator), fields(by = %locator.by))]
    pub fn resolve_detailed(&self, locator: &Locator) -> Result<Resolution, LocateError> {
        match locator.target()? {
            Target::Coords(point) => Ok(Resolution::direct(point)),
            Target::Image { path, fallback } => self.locate_image(&path, fallback),
            Target::Text(needle) => self.locate_text(&needle),
        }
    }

    fn locate_image(&self, path: &Path, fallback: Option<Point>) -> Result<Resolution, LocateError> {
        if !path.is_file() {
            return Err(LocateError::TemplateMissing(path.to_path_buf()));
        }
        let template = image::open(path)
            .map_err(|source| LocateError::TemplateUnreadable {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();

        let retries = self.config.image_retry_count.max(1);
        let timeout = self.config.timeout();
        let started = Instant::now();
        let mut attempts = 0;

        while attempts < retries {
            attempts += 1;
            match self.screen.capture() {
                Ok(shot) => {
                    if let Some(found) =
                        self.matcher
                            .find(&shot.image, &template, self.config.image_confidence)
                    {
                        let point = Point::new(
                            found.center.x.saturating_add(shot.origin.x),
                            found.center.y.saturating_add(shot.origin.y),
                        );
                        info!(
                            score = found.score,
                            "Found {} at {} on attempt {}",
                            path.display(),
                            point,
                            attempts
                        );
                        return Ok(Resolution {
                            point,
                            attempts,
                            used_fallback: false,
                        });
                    }
                    debug!(
                        "Attempt {}/{}: {} not on screen",
                        attempts,
                        retries,
                        path.display()
                    );
                }
                Err(e) => warn!("Attempt {}/{}: screen capture failed: {}", attempts, retries, e),
            }

            if attempts >= retries || started.elapsed() >= timeout {
                break;
            }
            let pause = self.config.image_retry_interval();
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }

        match fallback {
            Some(point) if self.config.enable_fallback => {
                warn!(
                    "Template {} not found after {} attempt(s), using fallback {}",
                    path.display(),
                    attempts,
                    point
                );
                Ok(Resolution {
                    point,
                    attempts,
                    used_fallback: true,
                })
            }
            _ => Err(LocateError::ImageNotFound {
                path: path.to_path_buf(),
                attempts,
            }),
        }
    }

    fn locate_text(&self, needle: &str) -> Result<Resolution, LocateError> {
        let ocr = match &self.ocr {
            Some(ocr) if self.config.ocr_enabled => ocr,
            _ => return Err(LocateError::OcrDisabled),
        };
        let shot = self.screen.capture()?;
        let boxes = ocr.recognize(&shot.image)?;
        let hit = find_text(&boxes, needle)
            .ok_or_else(|| LocateError::TextNotFound(needle.to_string()))?;
        let center = hit.center();
        let point = Point::new(
            center.x.saturating_add(shot.origin.x),
            center.y.saturating_add(shot.origin.y),
        );
        debug!("Text {:?} found in {:?} at {}", needle, hit.text, point);
        Ok(Resolution {
            point,
            attempts: 1,
            used_fallback: false,
        })
    }
}
