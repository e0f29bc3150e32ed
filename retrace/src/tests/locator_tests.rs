use super::{init_tracing, noise, MockOcr, MockScreen};
use crate::config::EngineConfig;
use crate::errors::LocateError;
use crate::locator::LocatorResolver;
use crate::matching::TemplateMatcher;
use crate::step::{Locator, Point};
use image::imageops;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn fast_config() -> EngineConfig {
    EngineConfig {
        image_retry_interval: 0.0,
        ..EngineConfig::default()
    }
}

fn resolver(screen: Arc<MockScreen>, config: EngineConfig) -> LocatorResolver {
    LocatorResolver::new(config, screen).with_matcher(TemplateMatcher::new().with_max_factor(1))
}

/// Writes a template cut from `seed` noise at `(x, y)` and returns its path.
fn template(dir: &TempDir, seed: u32, x: u32, y: u32) -> PathBuf {
    let source = noise(160, 120, seed);
    let crop = imageops::crop_imm(&source, x, y, 24, 24).to_image();
    let path = dir.path().join(format!("click_{seed}_{x}_{y}.png"));
    crop.save(&path).unwrap();
    path
}

#[test]
fn test_coords_pass_through_without_attempts() {
    let screen = Arc::new(MockScreen::blank());
    let resolved = resolver(screen.clone(), fast_config())
        .resolve_detailed(&Locator::coords(Point::new(100, 200)))
        .unwrap();
    assert_eq!(resolved.point, Point::new(100, 200));
    assert_eq!(resolved.attempts, 0);
    assert_eq!(screen.capture_count(), 0);
}

#[test]
fn test_missing_template_fails_immediately() {
    let screen = Arc::new(MockScreen::blank());
    let locator = Locator::image("/nonexistent/click_1.png", Some(Point::new(5, 5)));
    let err = resolver(screen.clone(), fast_config())
        .resolve_detailed(&locator)
        .unwrap_err();
    assert!(matches!(err, LocateError::TemplateMissing(_)));
    assert_eq!(screen.capture_count(), 0);
}

#[test]
fn test_template_found_in_screen_coordinates() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = template(&dir, 7, 60, 40);
    let screen = Arc::new(MockScreen::new(noise(160, 120, 7), Point::new(1920, 10)));

    let resolved = resolver(screen, fast_config())
        .resolve_detailed(&Locator::image(&path, Some(Point::new(1, 1))))
        .unwrap();
    assert_eq!(resolved.point, Point::new(1920 + 72, 10 + 52));
    assert_eq!(resolved.attempts, 1);
    assert!(!resolved.used_fallback);
}

#[test]
fn test_exhausted_search_uses_fallback_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let path = template(&dir, 99, 10, 10);
    let screen = Arc::new(MockScreen::new(noise(160, 120, 7), Point::new(0, 0)));
    let locator = Locator::image(&path, Some(Point::new(50, 60)));

    let resolved = resolver(screen.clone(), fast_config())
        .resolve_detailed(&locator)
        .unwrap();
    assert_eq!(resolved.point, Point::new(50, 60));
    assert_eq!(resolved.attempts, 3);
    assert!(resolved.used_fallback);
    assert_eq!(screen.capture_count(), 3);

    let strict = EngineConfig {
        enable_fallback: false,
        ..fast_config()
    };
    let err = resolver(screen, strict).resolve(&locator).unwrap_err();
    assert!(matches!(err, LocateError::ImageNotFound { attempts: 3, .. }));
}

#[test]
fn test_capture_failures_count_as_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = template(&dir, 3, 0, 0);
    let screen = Arc::new(MockScreen::failing());
    let config = EngineConfig {
        image_retry_count: 2,
        ..fast_config()
    };

    let resolved = resolver(screen.clone(), config)
        .resolve_detailed(&Locator::image(&path, Some(Point::new(9, 9))))
        .unwrap();
    assert_eq!(resolved.attempts, 2);
    assert!(resolved.used_fallback);
    assert_eq!(screen.capture_count(), 2);
}

#[test]
fn test_retry_interval_only_between_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = template(&dir, 5, 0, 0);
    let screen = Arc::new(MockScreen::failing());
    let config = EngineConfig {
        image_retry_count: 3,
        image_retry_interval: 0.1,
        enable_fallback: false,
        ..EngineConfig::default()
    };

    let started = Instant::now();
    let err = resolver(screen.clone(), config)
        .resolve(&Locator::image(&path, None))
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, LocateError::ImageNotFound { attempts: 3, .. }));
    assert_eq!(screen.capture_count(), 3);
    // Two pauses: one after each failed attempt except the last.
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
}

#[test]
fn test_timeout_cuts_retries_short() {
    let dir = tempfile::tempdir().unwrap();
    let path = template(&dir, 99, 0, 0);
    let screen = Arc::new(MockScreen::new(noise(160, 120, 7), Point::new(0, 0)));
    let config = EngineConfig {
        timeout: 0.0,
        image_retry_count: 5,
        enable_fallback: false,
        ..fast_config()
    };

    let err = resolver(screen.clone(), config)
        .resolve(&Locator::image(&path, None))
        .unwrap_err();
    assert!(matches!(err, LocateError::ImageNotFound { attempts: 1, .. }));
    assert_eq!(screen.capture_count(), 1);
}

#[test]
fn test_text_locator() {
    let screen = Arc::new(MockScreen::new(noise(32, 32, 1), Point::new(100, 0)));
    let ocr = Arc::new(MockOcr::with_words(&[
        ("Cancel", 10, 10, 40, 20),
        ("Submit", 60, 10, 41, 20),
        ("Submitted", 120, 10, 60, 20),
    ]));

    let disabled = resolver(screen.clone(), fast_config());
    assert!(matches!(
        disabled.resolve(&Locator::text("Submit")),
        Err(LocateError::OcrDisabled)
    ));

    let with_ocr = resolver(screen.clone(), fast_config()).with_ocr(ocr.clone());
    assert_eq!(
        with_ocr.resolve(&Locator::text("Submit")).unwrap(),
        Point::new(100 + 80, 20)
    );
    assert!(matches!(
        with_ocr.resolve(&Locator::text("Delete")),
        Err(LocateError::TextNotFound(s)) if s == "Delete"
    ));

    let switched_off = EngineConfig {
        ocr_enabled: false,
        ..fast_config()
    };
    assert!(matches!(
        resolver(screen, switched_off).with_ocr(ocr).resolve(&Locator::text("Submit")),
        Err(LocateError::OcrDisabled)
    ));
}

#[test]
fn test_unknown_strategy_and_bad_values() {
    let resolver = resolver(Arc::new(MockScreen::blank()), fast_config());
    let xpath: Locator = serde_json::from_value(json!({"by": "xpath", "value": "//a"})).unwrap();
    assert!(matches!(
        resolver.resolve(&xpath),
        Err(LocateError::UnsupportedLocatorStrategy(_))
    ));
    let bad: Locator = serde_json::from_value(json!({"by": "coords", "value": "here"})).unwrap();
    assert!(matches!(resolver.resolve(&bad), Err(LocateError::InvalidLocator(_))));
}
