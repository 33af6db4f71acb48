//! Greedy approximation of the linear assignment problem
//!
//! All `(row, column)` pairs are visited in ascending cost order and a pair is
//! taken whenever both its row and its column are still free. The result is a
//! complete matching but not necessarily an optimal one.

use bitvec::prelude::*;
use ndarray::ArrayView2;

use crate::algorithm::jonker_volgenant::{LapSolution, check_cost_matrix};
use crate::io::error::{MosaicError, Result};
use crate::io::progress::ProgressSink;

/// Greedily match every row of a square finite cost matrix to a distinct column
///
/// Equal costs keep row-major order.
///
/// # Errors
///
/// Returns a solver failure if the matrix is not square or holds non-finite entries
pub fn solve_lap_greedy(cost: ArrayView2<'_, f32>, progress: &dyn ProgressSink) -> Result<LapSolution> {
    check_cost_matrix(cost)?;
    let n = cost.nrows();
    tracing::info!("computing greedy assignment on a {n}x{n} matrix");

    let flat: Vec<f32> = cost.iter().copied().collect();
    let mut order: Vec<usize> = (0..flat.len()).collect();
    order.sort_by(|&a, &b| flat[a].total_cmp(&flat[b]));

    let mut row_taken = bitvec![0; n];
    let mut col_taken = bitvec![0; n];
    let mut assignment = vec![0; n];
    let mut assigned = 0;

    progress.start("Computing greedy assignment", n as u64);
    for index in order {
        if assigned == n {
            break;
        }
        let (row, col) = (index / n, index % n);
        if row_taken[row] || col_taken[col] {
            continue;
        }
        row_taken.set(row, true);
        col_taken.set(col, true);
        assignment[row] = col;
        assigned += 1;
        progress.advance(1);
    }
    progress.finish();

    if assigned != n {
        return Err(MosaicError::SolverFailure {
            size: n,
            reason: format!("greedy pass matched only {assigned} of {n} rows"),
        });
    }

    let solution = LapSolution::from_assignment(cost, assignment);
    tracing::info!(total_cost = solution.total_cost, "total assignment cost");
    Ok(solution)
}
