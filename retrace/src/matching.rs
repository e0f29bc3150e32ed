//! Template matching by zero-mean normalized cross-correlation.
//!
//! The search runs coarse-to-fine: both images are downscaled by a factor derived from
//! the template size, every offset is scored at the coarse level, and the few best
//! candidates are re-scored at full resolution in a small neighbourhood.

use crate::step::Point;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use tracing::trace;

const CANDIDATES: usize = 5;
const MIN_COARSE_SIDE: u32 = 8;
const MAX_FACTOR: u32 = 4;
/// Energy below this is treated as a flat (constant) patch.
const FLAT: f64 = 1e-6;

/// Best placement of a template inside an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Top-left corner of the template in image coordinates.
    pub top_left: Point,
    /// Center of the template in image coordinates.
    pub center: Point,
    /// Correlation score in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateMatcher {
    max_factor: u32,
}

impl Default for TemplateMatcher {
    fn default() -> Self {
        Self {
            max_factor: MAX_FACTOR,
        }
    }
}

/// Grayscale plane stored as `f32` for the correlation loops.
struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }
}

/// Template statistics reused for every offset.
struct Prepared {
    plane: Plane,
    mean: f64,
    /// Pixel values minus the template mean.
    centered: Vec<f32>,
    /// Sum of squares of `centered`.
    energy: f64,
}

impl Prepared {
    fn new(plane: Plane) -> Self {
        let n = plane.data.len().max(1) as f64;
        let mean = plane.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let centered: Vec<f32> = plane.data.iter().map(|&v| (v as f64 - mean) as f32).collect();
        let energy = centered.iter().map(|&v| (v as f64) * (v as f64)).sum();
        Self {
            plane,
            mean,
            centered,
            energy,
        }
    }
}

impl TemplateMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables or limits the coarse pass. A factor of 1 searches at full resolution.
    pub fn with_max_factor(mut self, factor: u32) -> Self {
        self.max_factor = factor.max(1);
        self
    }

    /// Finds `template` in `haystack`; `None` when the best score is below `confidence`
    /// or the template does not fit.
    pub fn find(&self, haystack: &RgbaImage, template: &RgbaImage, confidence: f32) -> Option<Match> {
        let found = self.best_match(haystack, template)?;
        trace!(score = found.score, "Best template placement at {}", found.top_left);
        (found.score >= confidence).then_some(found)
    }

    /// Highest-scoring placement regardless of confidence.
    pub fn best_match(&self, haystack: &RgbaImage, template: &RgbaImage) -> Option<Match> {
        let (hw, hh) = haystack.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > hw || th > hh {
            return None;
        }

        let hay_gray = imageops::grayscale(haystack);
        let tpl_gray = imageops::grayscale(template);
        let factor = self.factor_for(tw, th);

        let candidates: Vec<(usize, usize)> = if factor > 1 {
            let hay_small = imageops::resize(&hay_gray, hw / factor, hh / factor, FilterType::Triangle);
            let tpl_small = imageops::resize(&tpl_gray, tw / factor, th / factor, FilterType::Triangle);
            let coarse = top_offsets(
                &Plane::from_gray(&hay_small),
                &Prepared::new(Plane::from_gray(&tpl_small)),
                CANDIDATES,
            );
            coarse
                .into_iter()
                .map(|(_, x, y)| (x * factor as usize, y * factor as usize))
                .collect()
        } else {
            Vec::new()
        };

        let hay = Plane::from_gray(&hay_gray);
        let tpl = Prepared::new(Plane::from_gray(&tpl_gray));
        let max_x = hay.width - tpl.plane.width;
        let max_y = hay.height - tpl.plane.height;

        let mut best: Option<(f32, usize, usize)> = None;
        let mut consider = |x: usize, y: usize| {
            let score = zncc(&hay, &tpl, x, y);
            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, x, y));
            }
        };

        if candidates.is_empty() {
            for y in 0..=max_y {
                for x in 0..=max_x {
                    consider(x, y);
                }
            }
        } else {
            let radius = factor as usize;
            for (cx, cy) in candidates {
                for y in cy.saturating_sub(radius)..=(cy + radius).min(max_y) {
                    for x in cx.saturating_sub(radius)..=(cx + radius).min(max_x) {
                        consider(x, y);
                    }
                }
            }
        }

        best.map(|(score, x, y)| {
            let top_left = Point::new(x as i32, y as i32);
            Match {
                top_left,
                center: Point::new((x + tpl.plane.width / 2) as i32, (y + tpl.plane.height / 2) as i32),
                score,
            }
        })
    }

    fn factor_for(&self, tw: u32, th: u32) -> u32 {
        let side = tw.min(th);
        let mut factor = self.max_factor;
        while factor > 1 && side / factor < MIN_COARSE_SIDE {
            factor /= 2;
        }
        factor.max(1)
    }
}

/// The `keep` best offsets as `(score, x, y)`, best first.
fn top_offsets(hay: &Plane, tpl: &Prepared, keep: usize) -> Vec<(f32, usize, usize)> {
    let mut top: Vec<(f32, usize, usize)> = Vec::with_capacity(keep + 1);
    if tpl.plane.width > hay.width || tpl.plane.height > hay.height || tpl.plane.data.is_empty() {
        return top;
    }
    for y in 0..=(hay.height - tpl.plane.height) {
        for x in 0..=(hay.width - tpl.plane.width) {
            let score = zncc(hay, tpl, x, y);
            if top.len() < keep || score > top[top.len() - 1].0 {
                let at = top.iter().position(|(s, _, _)| score > *s).unwrap_or(top.len());
                top.insert(at, (score, x, y));
                top.truncate(keep);
            }
        }
    }
    top
}

/// Zero-mean normalized cross-correlation of the template placed at `(ox, oy)`.
fn zncc(hay: &Plane, tpl: &Prepared, ox: usize, oy: usize) -> f32 {
    let tw = tpl.plane.width;
    let th = tpl.plane.height;
    let n = (tw * th) as f64;

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut cross = 0.0f64;
    for ty in 0..th {
        let row = (oy + ty) * hay.width + ox;
        let window = &hay.data[row..row + tw];
        let centered = &tpl.centered[ty * tw..(ty + 1) * tw];
        for (&v, &t) in window.iter().zip(centered) {
            let v = v as f64;
            sum += v;
            sum_sq += v * v;
            cross += v * t as f64;
        }
    }

    // The template is zero-mean, so the window mean drops out of the cross term.
    let window_energy = (sum_sq - sum * sum / n).max(0.0);
    let flat_template = tpl.energy <= FLAT;
    let flat_window = window_energy <= FLAT;
    if flat_template || flat_window {
        // Only an identical flat patch counts as a hit.
        let same_level = (sum / n - tpl.mean).abs() < 1.0;
        return if flat_template && flat_window && same_level { 1.0 } else { 0.0 };
    }
    (cross / (tpl.energy * window_energy).sqrt()).clamp(-1.0, 1.0) as f32
}
