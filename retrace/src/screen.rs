//! Screen capture seam.

use crate::errors::ScreenError;
use crate::step::Point;
use image::{imageops, RgbaImage};
use tracing::{debug, instrument};

/// Holds a captured frame and the global coordinate of its top-left pixel.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub image: RgbaImage,
    pub origin: Point,
}

impl Screenshot {
    pub fn new(image: RgbaImage, origin: Point) -> Self {
        Self { image, origin }
    }

    /// Crops a square of side `size` centered on the global point `center`, clamped to
    /// the frame. Returns `None` when the point lies outside the frame.
    pub fn crop_around(&self, center: Point, size: u32) -> Option<RgbaImage> {
        let (width, height) = self.image.dimensions();
        let local_x = center.x as i64 - self.origin.x as i64;
        let local_y = center.y as i64 - self.origin.y as i64;
        if local_x < 0 || local_y < 0 || local_x >= width as i64 || local_y >= height as i64 {
            return None;
        }

        let half = (size / 2) as i64;
        let left = (local_x - half).max(0) as u32;
        let top = (local_y - half).max(0) as u32;
        let right = (local_x - half + size as i64).min(width as i64) as u32;
        let bottom = (local_y - half + size as i64).min(height as i64) as u32;
        if right <= left || bottom <= top {
            return None;
        }

        Some(imageops::crop_imm(&self.image, left, top, right - left, bottom - top).to_image())
    }
}

/// Source of screen frames.
pub trait Screen: Send + Sync {
    fn capture(&self) -> Result<Screenshot, ScreenError>;

    /// Square region around a point; see [`Screenshot::crop_around`].
    fn capture_region(&self, center: Point, size: u32) -> Result<RgbaImage, ScreenError> {
        let shot = self.capture()?;
        shot.crop_around(center, size).ok_or_else(|| {
            ScreenError::PlatformError(format!("Point {center} lies outside the captured screen"))
        })
    }
}

/// Captures the primary monitor through `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

impl Screen for XcapScreen {
    #[instrument(level = "debug", skip(self))]
    fn capture(&self) -> Result<Screenshot, ScreenError> {
        let monitors = xcap::Monitor::all().map_err(|e| {
            ScreenError::PlatformError(format!("Failed to enumerate monitors: {e}"))
        })?;

        let mut primary = None;
        for monitor in monitors.iter() {
            if monitor.is_primary().unwrap_or(false) {
                primary = Some(monitor);
                break;
            }
        }
        let monitor = primary.or(monitors.first()).ok_or(ScreenError::NoMonitor)?;

        let x = monitor.x().map_err(|e| {
            ScreenError::PlatformError(format!("Failed to get monitor x: {e}"))
        })?;
        let y = monitor.y().map_err(|e| {
            ScreenError::PlatformError(format!("Failed to get monitor y: {e}"))
        })?;
        let image = monitor.capture_image().map_err(|e| {
            ScreenError::PlatformError(format!("Failed to capture monitor: {e}"))
        })?;

        debug!(
            width = image.width(),
            height = image.height(),
            "Captured primary monitor at ({}, {})",
            x,
            y
        );
        Ok(Screenshot::new(image, Point::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn test_crop_is_centered() {
        let shot = Screenshot::new(gradient(200, 200), Point::new(0, 0));
        let crop = shot.crop_around(Point::new(100, 100), 20).unwrap();
        assert_eq!(crop.dimensions(), (20, 20));
        assert_eq!(crop.get_pixel(0, 0), &Rgba([90, 90, 0, 255]));
    }

    #[test]
    fn test_crop_clamps_at_edges_and_honours_origin() {
        let shot = Screenshot::new(gradient(50, 50), Point::new(1000, 0));
        let crop = shot.crop_around(Point::new(1002, 3), 20).unwrap();
        assert_eq!(crop.dimensions(), (12, 13));
        assert_eq!(crop.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));

        assert!(shot.crop_around(Point::new(5, 5), 20).is_none());
    }
}
