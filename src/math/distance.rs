//! Pairwise distance computation between destination blocks and tiles under a memory ceiling
//!
//! The full cost matrix (blocks x tiles) is never required to exist at once.
//! [`ChunkPlan`] derives how many block rows fit under the byte ceiling and
//! [`DistanceEngine::chunks`] streams the matrix in row groups of that size.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1, ArrayView2, s};
use num_traits::Float;

use crate::io::error::{MosaicError, Result, invalid_parameter};
use crate::math::backend::{DistanceKernel, NumericBackend};

/// Bytes per element of every distance matrix
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// Distance metric between two feature vectors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Metric {
    /// Squared euclidean distance, expanded as `|a|^2 + |b|^2 - 2ab`
    #[default]
    Euclidean,
    /// Sum of absolute differences
    Cityblock,
    /// Largest absolute difference
    Chebyshev,
    /// One minus the cosine similarity
    Cosine,
}

impl Metric {
    /// All supported metrics
    pub const ALL: [Self; 4] = [
        Self::Euclidean,
        Self::Cityblock,
        Self::Chebyshev,
        Self::Cosine,
    ];

    /// Lowercase name used on the command line
    pub const fn name(self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::Cityblock => "cityblock",
            Self::Chebyshev => "chebyshev",
            Self::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = MosaicError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|metric| metric.name() == lowered)
            .ok_or_else(|| {
                invalid_parameter(
                    "metric",
                    &s,
                    &"expected one of euclidean, cityblock, chebyshev, cosine",
                )
            })
    }
}

/// Sum of absolute differences
pub fn cityblock<T: Float>(a: ArrayView1<'_, T>, b: ArrayView1<'_, T>) -> T {
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc + (x - y).abs())
}

/// Largest absolute difference
pub fn chebyshev<T: Float>(a: ArrayView1<'_, T>, b: ArrayView1<'_, T>) -> T {
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (&x, &y)| acc.max((x - y).abs()))
}

/// Index of the first minimum, ignoring NaN entries
pub fn argmin(values: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::INFINITY;
    for (index, &value) in values.iter().enumerate() {
        if value < best_value {
            best_value = value;
            best = index;
        }
    }
    best
}

/// Row grouping for a distance matrix that must stay under a byte ceiling
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Rows evaluated per chunk
    pub stride: usize,
    /// Total rows of the matrix
    pub num_rows: usize,
}

impl ChunkPlan {
    /// Derive the row stride so that `stride * num_tiles * 4 <= limit_bytes - resident_bytes`
    ///
    /// `scratch_factor` divides the stride further for consumers that allocate
    /// per-row temporaries proportional to the chunk. A stride that collapses
    /// to zero degrades to one row with a warning.
    pub fn new(
        limit_bytes: usize,
        num_rows: usize,
        num_tiles: usize,
        resident_bytes: usize,
        scratch_factor: usize,
    ) -> Self {
        let row_bytes = num_tiles.max(1) * ELEMENT_SIZE;
        let available = limit_bytes.saturating_sub(resident_bytes);
        let mut stride = available / row_bytes / scratch_factor.max(1);

        if stride == 0 {
            tracing::warn!(
                limit_bytes,
                resident_bytes,
                "memory limit too small for a single distance row; computing one row at a time"
            );
            stride = 1;
        }

        let plan = Self {
            stride: stride.min(num_rows.max(1)),
            num_rows,
        };
        let matrix_mib = (num_rows * row_bytes) as f64 / f64::from(1 << 20);
        if plan.is_chunked() {
            tracing::info!(
                rows = num_rows,
                cols = num_tiles,
                matrix_mib,
                stride = plan.stride,
                "distance matrix computed in chunks"
            );
        } else {
            tracing::debug!(
                rows = num_rows,
                cols = num_tiles,
                matrix_mib,
                "no chunking performed on the distance matrix"
            );
        }
        plan
    }

    /// Plan that evaluates every row in one pass
    pub const fn single_pass(num_rows: usize) -> Self {
        Self {
            stride: if num_rows == 0 { 1 } else { num_rows },
            num_rows,
        }
    }

    /// Whether more than one chunk is needed
    pub const fn is_chunked(&self) -> bool {
        self.stride < self.num_rows
    }

    /// Row ranges in evaluation order
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + use<> {
        let stride = self.stride.max(1);
        let num_rows = self.num_rows;
        (0..num_rows)
            .step_by(stride)
            .map(move |start| start..(start + stride).min(num_rows))
    }
}

/// Distance evaluation between destination blocks and a fixed tile set
pub struct DistanceEngine {
    metric: Metric,
    kernel: Box<dyn DistanceKernel>,
    tile_keys: Array2<f32>,
    limit_bytes: usize,
}

impl fmt::Debug for DistanceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistanceEngine")
            .field("metric", &self.metric)
            .field("tiles", &self.tile_keys.nrows())
            .field("dimension", &self.tile_keys.ncols())
            .field("limit_bytes", &self.limit_bytes)
            .finish_non_exhaustive()
    }
}

impl DistanceEngine {
    /// Stage `tile_keys` (one feature vector per row) on `backend`
    ///
    /// # Errors
    ///
    /// Returns an error if there are no tiles or the backend cannot stage them
    pub fn new(
        backend: &dyn NumericBackend,
        metric: Metric,
        tile_keys: Array2<f32>,
        limit_bytes: usize,
    ) -> Result<Self> {
        if tile_keys.nrows() == 0 || tile_keys.ncols() == 0 {
            return Err(MosaicError::InvalidSourceData {
                reason: "no tile feature vectors to compare against".to_string(),
            });
        }
        let kernel = backend.prepare(metric, tile_keys.view())?;
        tracing::debug!(backend = backend.name(), %metric, tiles = tile_keys.nrows(), "distance kernel ready");
        Ok(Self {
            metric,
            kernel,
            tile_keys,
            limit_bytes,
        })
    }

    /// Metric in use
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of tiles (columns of the cost matrix)
    pub fn num_tiles(&self) -> usize {
        self.tile_keys.nrows()
    }

    /// Tile feature vectors in the active colorspace
    pub const fn tile_keys(&self) -> &Array2<f32> {
        &self.tile_keys
    }

    /// Byte ceiling for a single distance allocation
    pub const fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    /// Chunk plan for `num_rows` destination blocks
    ///
    /// Tile features and destination features count against the ceiling.
    pub fn plan(&self, num_rows: usize, scratch_factor: usize) -> ChunkPlan {
        let dim = self.tile_keys.ncols();
        let resident = (self.tile_keys.len() + num_rows * (1 + dim)) * ELEMENT_SIZE;
        ChunkPlan::new(
            self.limit_bytes,
            num_rows,
            self.num_tiles(),
            resident,
            scratch_factor,
        )
    }

    /// Distances for a batch of rows in a single kernel call
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel fails
    pub fn distances(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        self.kernel.distances(rows)
    }

    /// Stream the cost matrix for `rows` in chunks described by `plan`
    pub fn chunks<'a, 'b>(&'a self, rows: ArrayView2<'b, f32>, plan: ChunkPlan) -> DistanceChunks<'a, 'b> {
        DistanceChunks {
            engine: self,
            rows,
            ranges: Box::new(plan.ranges()),
        }
    }

    /// Materialize the complete cost matrix, assembled chunk by chunk
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk fails
    pub fn full(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let plan = self.plan(rows.nrows(), 1);
        let mut out = Array2::zeros((rows.nrows(), self.num_tiles()));
        for chunk in self.chunks(rows, plan) {
            let (start, block) = chunk?;
            out.slice_mut(s![start..start + block.nrows(), ..])
                .assign(&block);
        }
        Ok(out)
    }
}

/// Iterator over `(first_row, distances)` chunks of a cost matrix
pub struct DistanceChunks<'a, 'b> {
    engine: &'a DistanceEngine,
    rows: ArrayView2<'b, f32>,
    ranges: Box<dyn Iterator<Item = Range<usize>>>,
}

impl Iterator for DistanceChunks<'_, '_> {
    type Item = Result<(usize, Array2<f32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.ranges.next()?;
        let start = range.start;
        let chunk = self.rows.slice(s![range, ..]);
        Some(self.engine.distances(chunk).map(|d| (start, d)))
    }
}
