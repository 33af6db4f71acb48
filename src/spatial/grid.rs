//! Grid planning: how many tile columns and rows a mosaic gets
//!
//! Fair mosaics use every tile instance, so the grid must hold at least `n`
//! cells while its pixel aspect ratio stays as close as possible to the
//! requested one. Unfair mosaics fix the column count instead and derive rows
//! from the destination image.

use std::fmt;

use crate::io::error::{Result, invalid_parameter};

/// Tile grid dimensions in cells
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Grid {
    /// Number of tile columns
    pub cols: usize,
    /// Number of tile rows
    pub rows: usize,
}

impl Grid {
    /// Create a grid, rejecting empty dimensions
    ///
    /// # Errors
    ///
    /// Returns an error if either dimension is zero
    pub fn new(cols: usize, rows: usize) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(invalid_parameter(
                "grid",
                &format!("{cols}x{rows}"),
                &"grid needs at least one column and one row",
            ));
        }
        Ok(Self { cols, rows })
    }

    /// Total number of cells
    pub const fn cells(&self) -> usize {
        self.cols * self.rows
    }

    /// Pixel size of a collage built from `tile_w` x `tile_h` tiles
    pub const fn collage_size(&self, tile_w: u32, tile_h: u32) -> (u32, u32) {
        (self.cols as u32 * tile_w, self.rows as u32 * tile_h)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Squared deviation of a `cols x rows` grid of tiles from the target ratio
pub fn ratio_deviation(cols: usize, rows: usize, target: f64, tile_w: u32, tile_h: u32) -> f64 {
    let ratio = (cols as f64 * f64::from(tile_w)) / (rows as f64 * f64::from(tile_h));
    (ratio - target).powi(2)
}

/// Plan a grid for `n` tiles whose collage ratio best matches `ratio_w:ratio_h`
///
/// Every column count `w` in `1..=n` is paired with `ceil(n / w)` rows. The
/// candidate with the smallest squared ratio deviation wins; ties keep the
/// narrowest grid.
///
/// # Errors
///
/// Returns an error if `n`, either ratio term or either tile side is zero
pub fn calc_grid_size(
    ratio_w: u32,
    ratio_h: u32,
    n: usize,
    tile_w: u32,
    tile_h: u32,
) -> Result<Grid> {
    if n == 0 {
        return Err(invalid_parameter("num_tiles", &n, &"need at least one tile"));
    }
    if ratio_w == 0 || ratio_h == 0 {
        return Err(invalid_parameter(
            "ratio",
            &format!("{ratio_w}:{ratio_h}"),
            &"ratio terms must be positive",
        ));
    }
    if tile_w == 0 || tile_h == 0 {
        return Err(invalid_parameter(
            "tile_size",
            &format!("{tile_w}x{tile_h}"),
            &"tile sides must be positive",
        ));
    }

    let target = f64::from(ratio_w) / f64::from(ratio_h);
    let mut best = (1, n);
    let mut best_deviation = f64::INFINITY;
    for cols in 1..=n {
        let rows = n.div_ceil(cols);
        let deviation = ratio_deviation(cols, rows, target, tile_w, tile_h);
        if deviation < best_deviation {
            best_deviation = deviation;
            best = (cols, rows);
        }
    }

    let grid = Grid::new(best.0, best.1)?;
    let (width, height) = grid.collage_size(tile_w, tile_h);
    tracing::info!(tile_w, tile_h, %grid, "tile shape and grid size");
    tracing::info!(width, height, "collage size");
    Ok(grid)
}

/// Plan an unfair grid with a fixed column count
///
/// Rows are chosen so the collage keeps the destination's aspect ratio:
/// `round(dest_h * (max_width * tile_w / dest_w) / tile_h)`, at least one.
///
/// # Errors
///
/// Returns an error if any dimension is zero
pub fn unfair_grid_size(
    dest_w: u32,
    dest_h: u32,
    max_width: usize,
    tile_w: u32,
    tile_h: u32,
) -> Result<Grid> {
    if dest_w == 0 || dest_h == 0 {
        return Err(invalid_parameter(
            "dest_img",
            &format!("{dest_w}x{dest_h}"),
            &"destination image is empty",
        ));
    }
    if max_width == 0 {
        return Err(invalid_parameter(
            "max_width",
            &max_width,
            &"must be a positive number of tiles",
        ));
    }
    if tile_w == 0 || tile_h == 0 {
        return Err(invalid_parameter(
            "tile_size",
            &format!("{tile_w}x{tile_h}"),
            &"tile sides must be positive",
        ));
    }

    let scale = max_width as f64 * f64::from(tile_w) / f64::from(dest_w);
    let rows = (f64::from(dest_h) * scale / f64::from(tile_h)).round() as usize;
    let grid = Grid::new(max_width, rows.max(1))?;
    let (width, height) = grid.collage_size(tile_w, tile_h);
    tracing::info!(tile_w, tile_h, %grid, width, height, "unfair grid planned");
    Ok(grid)
}
