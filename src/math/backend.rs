//! Numeric backends that evaluate pairwise distances between block features and tiles
//!
//! A backend stages the tile matrix once through [`NumericBackend::prepare`] and
//! hands back a [`DistanceKernel`] that is then fed destination rows chunk by
//! chunk. Callers never learn which device executes the work.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::io::error::{Result, computation_error};
use crate::math::distance::{Metric, chebyshev, cityblock};

/// Norm used in place of zero when normalizing vectors for the cosine metric
pub const MIN_NORM: f32 = 1e-12;

/// Device capable of evaluating distance kernels
pub trait NumericBackend: Send + Sync + fmt::Debug {
    /// Short identifier used in log output
    fn name(&self) -> &'static str;

    /// Stage tile feature vectors for repeated distance queries
    ///
    /// # Errors
    ///
    /// Returns an error if the tiles cannot be staged on the device
    fn prepare(&self, metric: Metric, tiles: ArrayView2<'_, f32>)
    -> Result<Box<dyn DistanceKernel>>;
}

/// Staged tile matrix bound to one metric
pub trait DistanceKernel: Send + Sync {
    /// Number of tiles (columns of every result)
    fn num_tiles(&self) -> usize;

    /// Length of each feature vector
    fn dimension(&self) -> usize;

    /// Distances from every row of `rows` to every staged tile
    ///
    /// # Errors
    ///
    /// Returns an error if the row length doesn't match the tile dimension or
    /// the device fails during execution
    fn distances(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f32>>;
}

/// Backend running on the host with `ndarray`
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl NumericBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn prepare(
        &self,
        metric: Metric,
        tiles: ArrayView2<'_, f32>,
    ) -> Result<Box<dyn DistanceKernel>> {
        let staged = match metric {
            Metric::Cosine => l2_normalized(tiles),
            _ => tiles.to_owned(),
        };
        let tile_sq = staged.map_axis(Axis(1), |row| row.dot(&row));
        Ok(Box::new(CpuKernel {
            metric,
            tiles: staged,
            tile_sq,
        }))
    }
}

struct CpuKernel {
    metric: Metric,
    tiles: Array2<f32>,
    tile_sq: Array1<f32>,
}

impl DistanceKernel for CpuKernel {
    fn num_tiles(&self) -> usize {
        self.tiles.nrows()
    }

    fn dimension(&self) -> usize {
        self.tiles.ncols()
    }

    fn distances(&self, rows: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        check_dimension(rows.ncols(), self.dimension())?;

        let out = match self.metric {
            Metric::Euclidean => {
                // |a|^2 + |b|^2 - 2ab, clamped against cancellation below zero
                let mut product = rows.dot(&self.tiles.t());
                let row_sq = rows.map_axis(Axis(1), |row| row.dot(&row));
                Zip::from(product.rows_mut())
                    .and(&row_sq)
                    .for_each(|mut out_row, &a_sq| {
                        Zip::from(&mut out_row)
                            .and(&self.tile_sq)
                            .for_each(|value, &b_sq| {
                                *value = (-2.0f32).mul_add(*value, a_sq + b_sq).max(0.0);
                            });
                    });
                product
            }
            Metric::Cosine => {
                let normalized = l2_normalized(rows);
                let mut similarity = normalized.dot(&self.tiles.t());
                similarity.mapv_inplace(|s| 1.0 - s);
                similarity
            }
            Metric::Cityblock => Array2::from_shape_fn(
                (rows.nrows(), self.tiles.nrows()),
                |(i, j)| cityblock(rows.row(i), self.tiles.row(j)),
            ),
            Metric::Chebyshev => Array2::from_shape_fn(
                (rows.nrows(), self.tiles.nrows()),
                |(i, j)| chebyshev(rows.row(i), self.tiles.row(j)),
            ),
        };
        Ok(out)
    }
}

/// Reject row batches whose feature length differs from the staged tiles
///
/// # Errors
///
/// Returns a computation error on mismatch
pub fn check_dimension(got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(computation_error(
            "distance kernel",
            &format!("feature length {got} does not match tile feature length {expected}"),
        ))
    }
}

/// Scale every row to unit L2 norm
pub fn l2_normalized(matrix: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut out = matrix.to_owned();
    for mut row in out.rows_mut() {
        let norm = row.dot(&row).sqrt().max(MIN_NORM);
        row.mapv_inplace(|v| v / norm);
    }
    out
}

/// Pick the backend for a run
///
/// Without the `gpu` feature a GPU request falls back to the CPU with a warning.
///
/// # Errors
///
/// Returns an error if the GPU was requested, compiled in, and no adapter is available
pub fn select_backend(gpu: bool) -> Result<Arc<dyn NumericBackend>> {
    #[cfg(feature = "gpu")]
    if gpu {
        return Ok(Arc::new(crate::math::gpu::GpuBackend::new()?));
    }
    #[cfg(not(feature = "gpu"))]
    if gpu {
        tracing::warn!("GPU acceleration requested but this build has no GPU support; falling back to the CPU");
    }
    Ok(Arc::new(CpuBackend))
}
