//! Unfair assignment: any tile may fill any number of blocks
//!
//! Three strategies share the chunked distance stream:
//! - nearest tile per block
//! - nearest by rank plus a usage penalty, which spreads tiles more evenly
//! - raster order with Floyd-Steinberg error diffusion between blocks

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{SeedableRng, rngs::StdRng};

use crate::io::error::{Result, computation_error};
use crate::io::progress::ProgressSink;
use crate::math::distance::{ChunkPlan, DistanceEngine, argmin};
use crate::spatial::grid::Grid;

/// Error diffusion weights as `(row offset, column offset, weight)`
pub const DIFFUSION_KERNEL: [(isize, isize, f32); 4] = [
    (0, 1, 7.0 / 16.0),
    (1, -1, 3.0 / 16.0),
    (1, 0, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

/// Rank of every entry in ascending order; ties keep index order
pub fn rank_transform(values: ArrayView1<'_, f32>) -> Array1<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = Array1::zeros(values.len());
    for (rank, index) in order.into_iter().enumerate() {
        ranks[index] = rank as f64;
    }
    ranks
}

/// Tracks how often each tile was picked and penalizes reuse
///
/// A candidate's score is its distance rank plus `usage * freq_mul`. Ranks
/// make the penalty independent of the metric's scale.
#[derive(Clone, Debug)]
pub struct UsageBalancer {
    usage: Vec<u32>,
    freq_mul: f64,
}

impl UsageBalancer {
    /// Balancer over `num_tiles` tiles with penalty weight `freq_mul`
    pub fn new(num_tiles: usize, freq_mul: f64) -> Self {
        Self {
            usage: vec![0; num_tiles],
            freq_mul,
        }
    }

    /// Pick the tile with the lowest penalized rank and record its use
    pub fn pick(&mut self, distances: ArrayView1<'_, f32>) -> usize {
        let ranks = rank_transform(distances);
        let mut best = 0;
        let mut best_score = f64::INFINITY;
        for (index, (&rank, &used)) in ranks.iter().zip(&self.usage).enumerate() {
            let score = f64::from(used).mul_add(self.freq_mul, rank);
            if score < best_score {
                best_score = score;
                best = index;
            }
        }
        if let Some(count) = self.usage.get_mut(best) {
            *count += 1;
        }
        best
    }

    /// Times each tile has been picked
    pub fn usage(&self) -> &[u32] {
        &self.usage
    }
}

/// Order in which blocks are visited: identity, or shuffled when `randomize`
///
/// A seed makes the shuffle reproducible.
pub fn visiting_order(len: usize, randomize: bool, seed: Option<u64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if randomize {
        match seed {
            Some(seed) => order.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => order.shuffle(&mut rand::rng()),
        }
    }
    order
}

/// Nearest tile for every block
///
/// # Errors
///
/// Returns an error if a distance chunk fails
pub fn assign_nearest(
    engine: &DistanceEngine,
    blocks: ArrayView2<'_, f32>,
    plan: ChunkPlan,
    progress: &dyn ProgressSink,
) -> Result<Vec<usize>> {
    let mut assignment = Vec::with_capacity(blocks.nrows());
    progress.start("Computing assignments", blocks.nrows() as u64);
    for chunk in engine.chunks(blocks, plan) {
        let (_, distances) = chunk?;
        assignment.extend(distances.rows().into_iter().map(argmin));
        progress.advance(distances.nrows() as u64);
    }
    progress.finish();
    Ok(assignment)
}

/// Nearest tile by rank plus usage penalty, visiting blocks in `order`
///
/// The result is indexed by block, whatever the visiting order.
///
/// # Errors
///
/// Returns an error if `order` is not a permutation of the blocks or a
/// distance chunk fails
pub fn assign_balanced(
    engine: &DistanceEngine,
    blocks: ArrayView2<'_, f32>,
    plan: ChunkPlan,
    freq_mul: f64,
    order: &[usize],
    progress: &dyn ProgressSink,
) -> Result<Vec<usize>> {
    let total = blocks.nrows();
    if order.len() != total || order.iter().any(|&i| i >= total) {
        return Err(computation_error(
            "balanced assignment",
            &format!("visiting order of {} entries for {total} blocks", order.len()),
        ));
    }

    let visited = blocks.select(Axis(0), order);
    let mut balancer = UsageBalancer::new(engine.num_tiles(), freq_mul);
    let mut assignment = vec![0; total];

    progress.start("Computing assignments", total as u64);
    for chunk in engine.chunks(visited.view(), plan) {
        let (start, distances) = chunk?;
        for (offset, row) in distances.rows().into_iter().enumerate() {
            if let Some(&block) = order.get(start + offset) {
                assignment[block] = balancer.pick(row);
            }
            progress.advance(1);
        }
    }
    progress.finish();
    Ok(assignment)
}

/// Spread `error` from cell `(row, col)` onto its unvisited in-bounds neighbours
pub fn diffuse_quantization_error(
    blocks: &mut Array2<f32>,
    grid: Grid,
    row: usize,
    col: usize,
    error: ArrayView1<'_, f32>,
) {
    for (dr, dc, weight) in DIFFUSION_KERNEL {
        let (Some(r), Some(c)) = (row.checked_add_signed(dr), col.checked_add_signed(dc)) else {
            continue;
        };
        if r >= grid.rows || c >= grid.cols {
            continue;
        }
        let mut target = blocks.row_mut(r * grid.cols + c);
        target.scaled_add(weight, &error);
    }
}

/// Raster-order assignment with error diffusion
///
/// Each block, including the error diffused into it, is matched against the
/// tiles; `block - tile` is then spread to the right and lower neighbours.
/// A positive `freq_mul` adds the usage penalty to every match.
///
/// # Errors
///
/// Returns an error if the block count does not match the grid or a
/// distance evaluation fails
pub fn assign_dithered(
    engine: &DistanceEngine,
    blocks: ArrayView2<'_, f32>,
    grid: Grid,
    freq_mul: f64,
    progress: &dyn ProgressSink,
) -> Result<Vec<usize>> {
    if blocks.nrows() != grid.cells() {
        return Err(computation_error(
            "dithered assignment",
            &format!("{} blocks for a {grid} grid", blocks.nrows()),
        ));
    }

    let mut working = blocks.to_owned();
    let mut balancer = (freq_mul > 0.0).then(|| UsageBalancer::new(engine.num_tiles(), freq_mul));
    let mut assignment = Vec::with_capacity(grid.cells());

    progress.start("Computing assignments", grid.cells() as u64);
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let index = row * grid.cols + col;
            let block = working.row(index).to_owned();
            let distances = engine.distances(block.view().insert_axis(Axis(0)))?;
            let best = match balancer.as_mut() {
                Some(balancer) => balancer.pick(distances.row(0)),
                None => argmin(distances.row(0)),
            };
            assignment.push(best);

            let error = &block - &engine.tile_keys().row(best);
            diffuse_quantization_error(&mut working, grid, row, col, error.view());
            progress.advance(1);
        }
    }
    progress.finish();
    Ok(assignment)
}
