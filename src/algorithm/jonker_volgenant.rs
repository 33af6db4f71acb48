//! Exact linear assignment by shortest augmenting paths
//!
//! Rows are assigned one at a time. Each new row is connected to a free column
//! through a Dijkstra-like search over reduced costs, after which the dual
//! potentials `u` and `v` are updated so every reduced cost stays
//! non-negative. After `n` augmentations the matching is optimal.

use ndarray::ArrayView2;

use crate::io::error::{MosaicError, Result};
use crate::io::progress::ProgressSink;

/// Complete matching of a square cost matrix
#[derive(Clone, Debug, PartialEq)]
pub struct LapSolution {
    /// Column assigned to each row
    pub assignment: Vec<usize>,
    /// Sum of the matched costs
    pub total_cost: f64,
}

impl LapSolution {
    /// Build a solution from a row-to-column map, summing its cost
    pub fn from_assignment(cost: ArrayView2<'_, f32>, assignment: Vec<usize>) -> Self {
        let total_cost = assignment
            .iter()
            .enumerate()
            .map(|(row, &col)| f64::from(cost.get((row, col)).copied().unwrap_or(0.0)))
            .sum();
        Self {
            assignment,
            total_cost,
        }
    }
}

/// Reject matrices no solver can match completely
///
/// # Errors
///
/// Returns a solver failure for non-square matrices or non-finite entries
pub fn check_cost_matrix(cost: ArrayView2<'_, f32>) -> Result<()> {
    let (rows, cols) = cost.dim();
    if rows != cols {
        return Err(MosaicError::SolverFailure {
            size: rows.max(cols),
            reason: format!("cost matrix is {rows}x{cols}, expected a square matrix"),
        });
    }
    if let Some(bad) = cost.iter().find(|c| !c.is_finite()) {
        return Err(MosaicError::SolverFailure {
            size: rows,
            reason: format!("cost matrix contains a non-finite entry ({bad})"),
        });
    }
    Ok(())
}

struct Search {
    u: Vec<f64>,
    v: Vec<f64>,
    shortest: Vec<f64>,
    path: Vec<usize>,
    col4row: Vec<Option<usize>>,
    row4col: Vec<Option<usize>>,
    visited_rows: Vec<bool>,
    visited_cols: Vec<bool>,
    remaining: Vec<usize>,
}

impl Search {
    fn new(n: usize) -> Self {
        Self {
            u: vec![0.0; n],
            v: vec![0.0; n],
            shortest: vec![f64::INFINITY; n],
            path: vec![0; n],
            col4row: vec![None; n],
            row4col: vec![None; n],
            visited_rows: vec![false; n],
            visited_cols: vec![false; n],
            remaining: Vec::with_capacity(n),
        }
    }

    // Returns the free column reached from `start` and the path length to it
    fn augmenting_path(&mut self, cost: ArrayView2<'_, f32>, start: usize) -> Option<(usize, f64)> {
        let n = self.v.len();
        self.remaining.clear();
        self.remaining.extend((0..n).rev());
        self.visited_rows.fill(false);
        self.visited_cols.fill(false);
        self.shortest.fill(f64::INFINITY);

        let mut min_value = 0.0;
        let mut row = start;
        loop {
            self.visited_rows[row] = true;
            let mut lowest = f64::INFINITY;
            let mut index = None;

            for (k, &col) in self.remaining.iter().enumerate() {
                let reduced = min_value + f64::from(cost[(row, col)]) - self.u[row] - self.v[col];
                if reduced < self.shortest[col] {
                    self.path[col] = row;
                    self.shortest[col] = reduced;
                }
                // Ties prefer a free column so the search ends early
                if self.shortest[col] < lowest
                    || (self.shortest[col] == lowest && self.row4col[col].is_none())
                {
                    lowest = self.shortest[col];
                    index = Some(k);
                }
            }

            min_value = lowest;
            if !min_value.is_finite() {
                return None;
            }
            let index = index?;
            let col = self.remaining.swap_remove(index);
            self.visited_cols[col] = true;
            match self.row4col[col] {
                None => return Some((col, min_value)),
                Some(next) => row = next,
            }
        }
    }
}

/// Solve the linear assignment problem on a square finite cost matrix
///
/// `progress` receives one step per augmented row.
///
/// # Errors
///
/// Returns a solver failure if the matrix is not square, holds non-finite
/// entries or no augmenting path exists
pub fn solve_lap(cost: ArrayView2<'_, f32>, progress: &dyn ProgressSink) -> Result<LapSolution> {
    check_cost_matrix(cost)?;
    let n = cost.nrows();
    tracing::info!("computing optimal assignment on a {n}x{n} matrix");

    let mut search = Search::new(n);
    progress.start("Computing optimal assignment", n as u64);
    for current in 0..n {
        let (sink, min_value) =
            search
                .augmenting_path(cost, current)
                .ok_or_else(|| MosaicError::SolverFailure {
                    size: n,
                    reason: format!("no augmenting path from row {current}"),
                })?;

        search.u[current] += min_value;
        for row in 0..n {
            if search.visited_rows[row]
                && row != current
                && let Some(col) = search.col4row[row]
            {
                search.u[row] += min_value - search.shortest[col];
            }
        }
        for col in 0..n {
            if search.visited_cols[col] {
                search.v[col] -= min_value - search.shortest[col];
            }
        }

        let mut col = sink;
        loop {
            let row = search.path[col];
            search.row4col[col] = Some(row);
            let previous = search.col4row[row].replace(col);
            if row == current {
                break;
            }
            let Some(previous) = previous else {
                break;
            };
            col = previous;
        }
        progress.advance(1);
    }
    progress.finish();

    let assignment = search
        .col4row
        .into_iter()
        .enumerate()
        .map(|(row, col)| {
            col.ok_or_else(|| MosaicError::SolverFailure {
                size: n,
                reason: format!("row {row} left unassigned"),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let solution = LapSolution::from_assignment(cost, assignment);
    tracing::info!(total_cost = solution.total_cost, "total assignment cost");
    Ok(solution)
}
