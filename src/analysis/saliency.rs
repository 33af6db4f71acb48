//! Score maps marking the regions of a destination worth covering with tiles
//!
//! [`FineGrainedSaliency`] compares every pixel's intensity with the mean of
//! square surrounds at several scales (centre-surround contrast, both "on"
//! and "off" responses) using an integral image, then normalizes the sum to
//! `[0, 1]`. [`transparency_map`] marks every non-transparent pixel instead.

use image::{RgbImage, RgbaImage};
use ndarray::Array2;

use crate::io::error::{MosaicError, Result};

/// Producer of per-pixel saliency scores in `[0, 1]`
pub trait SaliencyDetector: Send + Sync {
    /// Score map of shape `(height, width)`
    ///
    /// # Errors
    ///
    /// Returns an error if the image is empty
    fn compute(&self, img: &RgbImage) -> Result<Array2<f32>>;
}

/// Surround radii used by the default detector
pub const DEFAULT_SURROUND_RADII: [usize; 5] = [1, 2, 4, 8, 16];

// Peaks below this are summed-area rounding noise on flat images
const MIN_CONTRAST: f64 = 1e-9;

/// Multi-scale centre-surround intensity contrast
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FineGrainedSaliency {
    radii: Vec<usize>,
}

impl Default for FineGrainedSaliency {
    fn default() -> Self {
        Self {
            radii: DEFAULT_SURROUND_RADII.to_vec(),
        }
    }
}

impl FineGrainedSaliency {
    /// Detector with custom surround radii
    pub fn with_radii(radii: Vec<usize>) -> Self {
        Self { radii }
    }
}

// Summed-area table with a zero border row and column
fn integral_image(intensity: &Array2<f64>) -> Array2<f64> {
    let (h, w) = intensity.dim();
    let mut table = Array2::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row_sum = 0.0;
        for x in 0..w {
            row_sum += intensity[(y, x)];
            table[(y + 1, x + 1)] = table[(y, x + 1)] + row_sum;
        }
    }
    table
}

fn box_mean(table: &Array2<f64>, y0: usize, x0: usize, y1: usize, x1: usize) -> f64 {
    let sum = table[(y1, x1)] - table[(y0, x1)] - table[(y1, x0)] + table[(y0, x0)];
    let area = ((y1 - y0) * (x1 - x0)).max(1);
    sum / area as f64
}

impl SaliencyDetector for FineGrainedSaliency {
    fn compute(&self, img: &RgbImage) -> Result<Array2<f32>> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        if w == 0 || h == 0 {
            return Err(MosaicError::InvalidSourceData {
                reason: "cannot compute saliency of an empty image".to_string(),
            });
        }

        let intensity = Array2::from_shape_fn((h, w), |(y, x)| {
            let p = img.get_pixel(x as u32, y as u32);
            (f64::from(p[0]) + f64::from(p[1]) + f64::from(p[2])) / (3.0 * 255.0)
        });
        let table = integral_image(&intensity);

        let mut on = Array2::<f64>::zeros((h, w));
        let mut off = Array2::<f64>::zeros((h, w));
        for &radius in &self.radii {
            for y in 0..h {
                let (y0, y1) = (y.saturating_sub(radius), (y + radius + 1).min(h));
                for x in 0..w {
                    let (x0, x1) = (x.saturating_sub(radius), (x + radius + 1).min(w));
                    let surround = box_mean(&table, y0, x0, y1, x1);
                    let centre = intensity[(y, x)];
                    on[(y, x)] += (centre - surround).max(0.0);
                    off[(y, x)] += (surround - centre).max(0.0);
                }
            }
        }

        let combined = on + off;
        let peak = combined.fold(0.0f64, |acc, &v| acc.max(v));
        let scale = if peak > MIN_CONTRAST { 1.0 / peak } else { 0.0 };
        Ok(combined.mapv(|v| (v * scale) as f32))
    }
}

/// 1.0 where the pixel is not fully transparent, 0.0 elsewhere
pub fn transparency_map(img: &RgbaImage) -> Array2<f32> {
    Array2::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
        if img.get_pixel(x as u32, y as u32)[3] > 0 {
            1.0
        } else {
            0.0
        }
    })
}
