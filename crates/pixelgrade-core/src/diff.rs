//! Perceptual pixel diff over raw RGBA buffers.
//!
//! Colour distance is measured in YIQ space with alpha blended against white,
//! and pixels that look like anti-aliasing on either side are not counted.
//! The diff image paints counted pixels red, anti-aliased pixels yellow and
//! unchanged pixels as faded greyscale.

use anyhow::{ensure, Result};

use crate::results::{SizeMismatch, VisualDiffResult};

/// Largest possible YIQ delta between two colours.
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Tuning knobs for [`compare`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffOptions {
    /// Matching threshold in `[0, 1]`; smaller is more sensitive.
    pub threshold: f64,
    /// Count anti-aliased pixels as differences.
    pub include_aa: bool,
    /// Opacity of unchanged pixels in the diff image.
    pub alpha: f64,
    pub aa_color: [u8; 3],
    pub diff_color: [u8; 3],
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            include_aa: false,
            alpha: 0.1,
            aa_color: [255, 255, 0],
            diff_color: [255, 0, 0],
        }
    }
}

/// An owned RGBA8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA bytes, `width * height * 4` long.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        ensure!(
            data.len() == width as usize * height as usize * 4,
            "RGBA buffer is {} bytes, expected {} for {width}x{height}",
            data.len(),
            width as usize * height as usize * 4
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Result of comparing two frames.
#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub diff_pixels: u64,
    pub total_pixels: u64,
    /// Visualisation on the expected frame's grid.
    pub image: Frame,
    pub size_mismatch: Option<SizeMismatch>,
}

impl DiffOutcome {
    pub fn to_result(&self) -> VisualDiffResult {
        let mut result = VisualDiffResult::from_counts(self.diff_pixels, self.total_pixels);
        result.size_mismatch = self.size_mismatch;
        result
    }
}

/// Compare `candidate` against `expected`.
///
/// The comparison runs over the expected frame's grid; when sizes differ,
/// expected pixels the candidate does not cover count as different.
pub fn compare(candidate: &Frame, expected: &Frame, options: &DiffOptions) -> DiffOutcome {
    let width = expected.width;
    let height = expected.height;
    let overlap_w = width.min(candidate.width);
    let overlap_h = height.min(candidate.height);

    let size_mismatch = (candidate.width != width || candidate.height != height).then_some(
        SizeMismatch {
            candidate_width: candidate.width,
            candidate_height: candidate.height,
            expected_width: width,
            expected_height: height,
        },
    );

    let max_delta = MAX_YIQ_DELTA * options.threshold * options.threshold;
    let diff_rgba = opaque(options.diff_color);
    let aa_rgba = opaque(options.aa_color);
    let mut image = Frame::solid(width, height, [0, 0, 0, 255]);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            if x >= overlap_w || y >= overlap_h {
                image.put_pixel(x, y, diff_rgba);
                diff_pixels += 1;
                continue;
            }

            let a = candidate.pixel(x, y);
            let b = expected.pixel(x, y);
            let delta = color_delta(a, b, false);

            if delta.abs() > max_delta {
                let aa = !options.include_aa
                    && (antialiased(candidate, x, y, overlap_w, overlap_h, expected)
                        || antialiased(expected, x, y, overlap_w, overlap_h, candidate));
                if aa {
                    image.put_pixel(x, y, aa_rgba);
                } else {
                    image.put_pixel(x, y, diff_rgba);
                    diff_pixels += 1;
                }
            } else {
                image.put_pixel(x, y, gray(b, options.alpha));
            }
        }
    }

    DiffOutcome {
        diff_pixels,
        total_pixels: expected.pixel_count(),
        image,
        size_mismatch,
    }
}

fn opaque([r, g, b]: [u8; 3]) -> [u8; 4] {
    [r, g, b, 255]
}

// ---------------------------------------------------------------------------
// YIQ colour distance
// ---------------------------------------------------------------------------

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

/// Blend a channel with white at opacity `a`.
fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn blended([r, g, b, a]: [u8; 4]) -> (f64, f64, f64) {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    if a < 255 {
        let a = a as f64 / 255.0;
        (blend(r, a), blend(g, a), blend(b, a))
    } else {
        (r, g, b)
    }
}

/// Squared YIQ distance, negative when `a` is brighter than `b`.
/// With `y_only` the signed brightness difference alone is returned.
fn color_delta(a: [u8; 4], b: [u8; 4], y_only: bool) -> f64 {
    if a == b {
        return 0.0;
    }
    let (r1, g1, b1) = blended(a);
    let (r2, g2, b2) = blended(b);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

fn gray(rgba: [u8; 4], alpha: f64) -> [u8; 4] {
    let (r, g, b) = (rgba[0] as f64, rgba[1] as f64, rgba[2] as f64);
    let value = blend(rgb2y(r, g, b), alpha * rgba[3] as f64 / 255.0).clamp(0.0, 255.0) as u8;
    [value, value, value, 255]
}

// ---------------------------------------------------------------------------
// Anti-aliasing detection
// ---------------------------------------------------------------------------

/// 3x3 neighbourhood bounds clipped to `width`x`height`.
fn neighbourhood(x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

/// Whether the pixel at `(x1, y1)` of `img` looks like an anti-aliased edge.
fn antialiased(img: &Frame, x1: u32, y1: u32, width: u32, height: u32, other: &Frame) -> bool {
    let (x0, y0, x2, y2) = neighbourhood(x1, y1, width, height);
    let center = img.pixel(x1, y1);
    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    let mut min = 0.0;
    let mut max = 0.0;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (0, 0, 0, 0);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(center, img.pixel(x, y), true);
            if delta == 0.0 {
                zeroes += 1;
                // More than two identical siblings: not an edge
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_x = x;
                min_y = y;
            } else if delta > max {
                max = delta;
                max_x = x;
                max_y = y;
            }
        }
    }

    // Needs both a darker and a brighter neighbour
    if min == 0.0 || max == 0.0 {
        return false;
    }

    (has_many_siblings(img, min_x, min_y, width, height)
        && has_many_siblings(other, min_x, min_y, width, height))
        || (has_many_siblings(img, max_x, max_y, width, height)
            && has_many_siblings(other, max_x, max_y, width, height))
}

/// Whether the pixel has more than two identical neighbours.
fn has_many_siblings(img: &Frame, x1: u32, y1: u32, width: u32, height: u32) -> bool {
    let (x0, y0, x2, y2) = neighbourhood(x1, y1, width, height);
    let center = img.pixel(x1, y1);
    let mut zeroes = u32::from(x1 == x0 || x1 == x2 || y1 == y0 || y1 == y2);

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            if img.pixel(x, y) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    #[test]
    fn identical_frames_have_no_diff() {
        let a = Frame::solid(10, 10, WHITE);
        let outcome = compare(&a, &a.clone(), &DiffOptions::default());
        assert_eq!(outcome.diff_pixels, 0);
        assert_eq!(outcome.total_pixels, 100);
        assert!(outcome.size_mismatch.is_none());
        let result = outcome.to_result();
        assert_eq!(result.score, 100);
        assert_eq!(result.diff_percentage, 0.0);
        // Unchanged white stays white
        assert_eq!(outcome.image.pixel(3, 3), WHITE);
    }

    #[test]
    fn isolated_changed_pixel_is_counted_and_painted() {
        let expected = Frame::solid(10, 10, WHITE);
        let mut candidate = expected.clone();
        candidate.put_pixel(5, 5, BLACK);

        let outcome = compare(&candidate, &expected, &DiffOptions::default());
        assert_eq!(outcome.diff_pixels, 1);
        assert_eq!(outcome.image.pixel(5, 5), [255, 0, 0, 255]);
        assert_eq!(outcome.to_result().score, 99);
    }

    #[test]
    fn small_colour_shift_is_below_threshold() {
        let expected = Frame::solid(4, 4, [200, 200, 200, 255]);
        let candidate = Frame::solid(4, 4, [203, 201, 200, 255]);
        let outcome = compare(&candidate, &expected, &DiffOptions::default());
        assert_eq!(outcome.diff_pixels, 0);
    }

    #[test]
    fn completely_different_frames_score_zero() {
        let expected = Frame::solid(8, 8, WHITE);
        let candidate = Frame::solid(8, 8, BLACK);
        let outcome = compare(&candidate, &expected, &DiffOptions::default());
        assert_eq!(outcome.diff_pixels, 64);
        assert_eq!(outcome.to_result().score, 0);
    }

    #[test]
    fn size_mismatch_counts_uncovered_pixels() {
        let expected = Frame::solid(10, 10, WHITE);
        let candidate = Frame::solid(10, 5, WHITE);
        let outcome = compare(&candidate, &expected, &DiffOptions::default());

        assert_eq!(outcome.diff_pixels, 50);
        assert_eq!(outcome.total_pixels, 100);
        assert_eq!(outcome.image.width, 10);
        assert_eq!(outcome.image.height, 10);
        let mismatch = outcome.size_mismatch.unwrap();
        assert_eq!(mismatch.candidate_height, 5);
        assert_eq!(mismatch.expected_height, 10);
        assert_eq!(outcome.to_result().score, 50);
    }

    #[test]
    fn larger_candidate_is_cropped_to_expected_grid() {
        let expected = Frame::solid(4, 4, WHITE);
        let candidate = Frame::solid(6, 6, WHITE);
        let outcome = compare(&candidate, &expected, &DiffOptions::default());
        assert_eq!(outcome.diff_pixels, 0);
        assert!(outcome.size_mismatch.is_some());
    }

    #[test]
    fn transparent_pixels_blend_with_white() {
        let expected = Frame::solid(2, 2, WHITE);
        let candidate = Frame::solid(2, 2, [0, 0, 0, 0]);
        let outcome = compare(&candidate, &expected, &DiffOptions::default());
        assert_eq!(outcome.diff_pixels, 0);
    }

    #[test]
    fn color_delta_sign_follows_brightness() {
        assert!(color_delta(WHITE, BLACK, false) < 0.0);
        assert!(color_delta(BLACK, WHITE, false) > 0.0);
        assert_eq!(color_delta(WHITE, WHITE, false), 0.0);
        let full = color_delta(BLACK, WHITE, false);
        assert!(full <= MAX_YIQ_DELTA, "{full}");
    }

    #[test]
    fn uniform_area_has_many_siblings() {
        let frame = Frame::solid(5, 5, WHITE);
        assert!(has_many_siblings(&frame, 2, 2, 5, 5));

        let mut dot = Frame::solid(3, 3, WHITE);
        dot.put_pixel(1, 1, BLACK);
        dot.put_pixel(0, 0, BLACK);
        assert!(!has_many_siblings(&dot, 1, 1, 3, 3));
    }

    #[test]
    fn from_raw_validates_length() {
        assert!(Frame::from_raw(2, 2, vec![0; 16]).is_ok());
        assert!(Frame::from_raw(2, 2, vec![0; 15]).is_err());
    }
}
