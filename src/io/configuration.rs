//! Pipeline constants and runtime configuration

use crate::io::error::{Result, invalid_parameter};
use crate::math::colorspace::Colorspace;
use crate::math::distance::Metric;

/// Bytes per mebibyte
pub const MIB: usize = 1 << 20;

// Memory ceiling for a single distance allocation
/// Default memory limit in MiB
pub const DEFAULT_MEM_LIMIT_MIB: usize = 4096;

/// Default tile width in pixels
pub const DEFAULT_TILE_WIDTH: u32 = 50;

/// Default collage aspect ratio when no destination image is given
pub const DEFAULT_RATIO: [u32; 2] = [16, 9];

/// Default number of tile columns in unfair mode
pub const DEFAULT_MAX_WIDTH: usize = 80;

/// Default saliency threshold
pub const DEFAULT_LOWER_THRESH: f32 = 0.5;

/// Threshold applied to transparency maps, which only hold 0.0 or 1.0
pub const TRANSPARENCY_THRESHOLD: f32 = 0.5;

/// Default output file
pub const DEFAULT_OUTPUT: &str = "result.png";

// Balanced assignment keeps a rank matrix and penalty buffers next to each chunk
/// Chunk stride divisor when the frequency multiplier is positive
pub const BALANCED_SCRATCH_FACTOR: usize = 16;
/// Chunk stride divisor for plain nearest-tile assignment
pub const NEAREST_SCRATCH_FACTOR: usize = 4;

/// Cell count above which exact fair assignment gets a slowness warning
pub const LARGE_PROBLEM_CELLS: usize = 10_000;

// Progress bar display settings
/// Width of progress bars in characters
pub const PROGRESS_BAR_WIDTH: u16 = 40;

/// Frames buffered per worker in the video job queue
pub const FRAME_QUEUE_DEPTH: usize = 2;

/// Options of the unfair policy
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnfairConfig {
    /// Number of tile columns
    pub max_width: usize,
    /// Weight of the usage penalty; zero disables balancing
    pub freq_mul: f64,
    /// Visit blocks in shuffled order while balancing
    pub randomize: bool,
    /// Diffuse quantization error to neighbouring blocks
    pub dither: bool,
    /// Seed for the shuffled visiting order
    pub seed: Option<u64>,
}

impl Default for UnfairConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            freq_mul: 0.0,
            randomize: true,
            dither: false,
            seed: None,
        }
    }
}

/// Everything an engine needs to turn a destination image into a mosaic
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MosaicConfig {
    /// Space in which block features are compared
    pub colorspace: Colorspace,
    /// Distance between feature vectors
    pub metric: Metric,
    /// Memory ceiling in MiB for one run (divided among video workers)
    pub mem_limit_mib: usize,
    /// Tile duplication factor for fair policies
    pub dup: f64,
    /// Use the greedy solver instead of the exact one
    pub greedy: bool,
    /// Restrict tiles to salient regions
    pub salient: bool,
    /// Saliency threshold in `(0, 1)`, checked only when `salient` is set
    pub lower_thresh: f32,
    /// Keep transparent regions of the destination empty
    pub transparent: bool,
    /// Unfair policy options, `None` for the fair policies
    pub unfair: Option<UnfairConfig>,
    /// Evaluate distances on the GPU
    pub gpu: bool,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            colorspace: Colorspace::default(),
            metric: Metric::default(),
            mem_limit_mib: DEFAULT_MEM_LIMIT_MIB,
            dup: 1.0,
            greedy: false,
            salient: false,
            lower_thresh: DEFAULT_LOWER_THRESH,
            transparent: false,
            unfair: None,
            gpu: false,
        }
    }
}

impl MosaicConfig {
    /// Reject values that would fail later in the pipeline
    ///
    /// # Errors
    ///
    /// Returns an invalid parameter error naming the first offending option
    pub fn validate(&self) -> Result<()> {
        if !(self.dup.is_finite() && self.dup > 0.0) {
            return Err(invalid_parameter(
                "dup",
                &self.dup,
                &"must be a positive integer or a real number between 0 and 1",
            ));
        }
        if self.salient && !(self.lower_thresh > 0.0 && self.lower_thresh < 1.0) {
            return Err(invalid_parameter(
                "lower_thresh",
                &self.lower_thresh,
                &"must lie strictly between 0.0 and 1.0",
            ));
        }
        if self.mem_limit_mib == 0 {
            return Err(invalid_parameter(
                "mem_limit",
                &self.mem_limit_mib,
                &"must be at least 1 MiB",
            ));
        }
        if let Some(unfair) = &self.unfair {
            if unfair.max_width == 0 {
                return Err(invalid_parameter(
                    "max_width",
                    &unfair.max_width,
                    &"must be at least one tile",
                ));
            }
            if !(unfair.freq_mul.is_finite() && unfair.freq_mul >= 0.0) {
                return Err(invalid_parameter(
                    "freq_mul",
                    &unfair.freq_mul,
                    &"must be a finite number of at least 0",
                ));
            }
        }
        Ok(())
    }

    /// Byte ceiling for each of `workers` concurrent engines
    pub fn limit_bytes(&self, workers: usize) -> usize {
        (self.mem_limit_mib / workers.max(1)).saturating_mul(MIB)
    }
}
