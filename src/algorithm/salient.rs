//! Restricting a mosaic to the salient cells of a score map
//!
//! A score map (saliency or transparency, values in `[0, 1]`) is cut into
//! blocks and every block whose maximum score reaches the threshold is
//! selected. Fair salient mosaics additionally shrink the block size until the
//! selection can hold every tile instance.

use image::{ImageBuffer, Luma, imageops};
use ndarray::{Array2, s};

use crate::io::error::{MosaicError, Result};
use crate::spatial::blocks::BlockGeometry;
use crate::spatial::grid::Grid;
use crate::spatial::tiles::RESIZE_FILTER;

/// Smallest block side the shrinking search may reach
pub const MIN_SALIENT_BLOCK_SIDE: u32 = 1;

/// Cells chosen from a score map, in row-major order
#[derive(Clone, Debug, PartialEq)]
pub struct CellSelection {
    /// Row index of every selected cell
    pub rows: Vec<usize>,
    /// Column index of every selected cell
    pub cols: Vec<usize>,
    /// Grid the cells belong to
    pub grid: Grid,
    /// Block width in map pixels
    pub block_width: u32,
    /// Block height in map pixels
    pub block_height: u32,
    /// Score map cropped and resized to `grid * block` pixels
    pub map: Array2<f32>,
}

impl CellSelection {
    /// Number of selected cells
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no cell was selected
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(row, col)` of every selected cell
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.rows.iter().copied().zip(self.cols.iter().copied())
    }

    /// Block geometry matching the resized map
    pub fn geometry(&self) -> BlockGeometry {
        BlockGeometry::from_blocks(self.grid, self.block_width, self.block_height)
    }
}

/// Bilinear resize of a score map to `width x height`
///
/// # Errors
///
/// Returns an error if the map buffer is inconsistent with its shape
pub fn resize_map(map: &Array2<f32>, width: usize, height: usize) -> Result<Array2<f32>> {
    let (rows, cols) = map.dim();
    if (rows, cols) == (height, width) {
        return Ok(map.clone());
    }
    let raw: Vec<f32> = map.iter().copied().collect();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(cols as u32, rows as u32, raw).ok_or_else(|| {
            MosaicError::Computation {
                operation: "score map resize",
                reason: format!("buffer does not match a {cols}x{rows} map"),
            }
        })?;
    let resized = imageops::resize(&buffer, width as u32, height as u32, RESIZE_FILTER);
    Array2::from_shape_vec((height, width), resized.into_raw()).map_err(|e| {
        MosaicError::Computation {
            operation: "score map resize",
            reason: e.to_string(),
        }
    })
}

/// Select the `block_width x block_height` blocks whose maximum score is at least `lower`
///
/// The map is first resized so its sides are multiples of the block sides
/// (`w - w % block_width`, `h - h % block_height`).
///
/// # Errors
///
/// Returns an error if the map is smaller than a single block
pub fn compute_block_map(
    map: &Array2<f32>,
    block_width: u32,
    block_height: u32,
    lower: f32,
) -> Result<CellSelection> {
    let (height, width) = map.dim();
    let bw = block_width.max(MIN_SALIENT_BLOCK_SIDE) as usize;
    let bh = block_height.max(MIN_SALIENT_BLOCK_SIDE) as usize;
    let (dst_w, dst_h) = (width - width % bw, height - height % bh);
    if dst_w == 0 || dst_h == 0 {
        return Err(MosaicError::InvalidSourceData {
            reason: format!("score map of {width}x{height} is smaller than a {bw}x{bh} block"),
        });
    }

    let resized = resize_map(map, dst_w, dst_h)?;
    let grid = Grid::new(dst_w / bw, dst_h / bh)?;
    let mut rows = Vec::new();
    let mut cols = Vec::new();
    for r in 0..grid.rows {
        for c in 0..grid.cols {
            let block = resized.slice(s![r * bh..(r + 1) * bh, c * bw..(c + 1) * bw]);
            let peak = block.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            if peak >= lower {
                rows.push(r);
                cols.push(c);
            }
        }
    }

    Ok(CellSelection {
        rows,
        cols,
        grid,
        block_width: bw as u32,
        block_height: bh as u32,
        map: resized,
    })
}

/// Shrink blocks until at least `required` cells are salient
///
/// Blocks start at the size `initial_grid` gives the map. Each step takes one
/// pixel off the longer block side and a proportional fraction off the
/// shorter one, so the block aspect ratio is preserved. If a side would drop
/// below [`MIN_SALIENT_BLOCK_SIDE`] the clamped selection is returned with a
/// warning even if it holds fewer than `required` cells.
///
/// # Errors
///
/// Returns an error if the map is empty
pub fn select_salient_cells(
    map: &Array2<f32>,
    initial_grid: Grid,
    required: usize,
    lower: f32,
) -> Result<CellSelection> {
    let (height, width) = map.dim();
    if width == 0 || height == 0 {
        return Err(MosaicError::InvalidSourceData {
            reason: "score map is empty".to_string(),
        });
    }

    let mut bw_f = width as f64 / initial_grid.cols as f64;
    let mut bh_f = height as f64 / initial_grid.rows as f64;
    let (bw_step, bh_step) = if bw_f > bh_f {
        (1.0, bh_f / bw_f)
    } else {
        (bw_f / bh_f, 1.0)
    };
    let min_side = f64::from(MIN_SALIENT_BLOCK_SIDE);
    let max_steps = bw_f.max(bh_f).ceil() as usize;

    for _ in 0..=max_steps {
        if bw_f < min_side || bh_f < min_side {
            break;
        }
        let selection = compute_block_map(map, bw_f as u32, bh_f as u32, lower)?;
        if selection.len() >= required {
            tracing::info!(
                block_width = selection.block_width,
                block_height = selection.block_height,
                grid = %selection.grid,
                selected = selection.len(),
                "salient block size"
            );
            return Ok(selection);
        }
        bw_f -= bw_step;
        bh_f -= bh_step;
    }

    tracing::warn!(
        required,
        "salient area is too small to put down all tiles; try a higher saliency threshold if this is not desired"
    );
    let clamped = (bw_f.max(min_side) as u32, bh_f.max(min_side) as u32);
    compute_block_map(map, clamped.0, clamped.1, lower)
}
