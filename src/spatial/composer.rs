//! Mosaic composition from a grid and an ordered tile sequence

use std::fmt;

use image::{Rgba, RgbaImage};

use crate::algorithm::salient::CellSelection;
use crate::io::error::{MosaicError, Result, computation_error};
use crate::io::progress::ProgressSink;
use crate::spatial::grid::Grid;
use crate::spatial::tiles::Tile;

/// Ledger label of cells without a tile
pub const BACKGROUND_LABEL: &str = "background";

/// Fill color of cells without a tile
pub const BACKGROUND_PIXEL: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Row-major ledger of the tile label placed in every cell
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileInfo {
    grid: Grid,
    labels: Vec<String>,
}

impl TileInfo {
    /// Ledger with every cell set to the background label
    pub fn background(grid: Grid) -> Self {
        Self {
            grid,
            labels: vec![BACKGROUND_LABEL.to_string(); grid.cells()],
        }
    }

    /// Grid the ledger describes
    pub const fn grid(&self) -> Grid {
        self.grid
    }

    /// Labels in row-major order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label at `(row, col)`
    pub fn label(&self, row: usize, col: usize) -> Option<&str> {
        if col >= self.grid.cols {
            return None;
        }
        self.labels
            .get(row * self.grid.cols + col)
            .map(String::as_str)
    }

    fn set(&mut self, row: usize, col: usize, label: &str) {
        if let Some(slot) = self.labels.get_mut(row * self.grid.cols + col) {
            label.clone_into(slot);
        }
    }
}

impl fmt::Display for TileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid dimension: ({}, {})", self.grid.rows, self.grid.cols)?;
        for label in &self.labels {
            write!(f, "\n{label}")?;
        }
        Ok(())
    }
}

/// A composed mosaic and its ledger
#[derive(Clone, Debug)]
pub struct Mosaic {
    /// RGBA canvas of `cols * tile_w` by `rows * tile_h` pixels
    pub image: RgbaImage,
    /// Label of every cell
    pub info: TileInfo,
}

/// How a tile sequence was fitted to the grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositionReport {
    /// Transparent cells appended because the sequence was short
    pub padded: usize,
    /// Tiles dropped because the sequence was long
    pub dropped: usize,
}

/// Paints tiles into an RGBA canvas
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MosaicComposer {
    tile_width: u32,
    tile_height: u32,
}

impl MosaicComposer {
    /// Composer for tiles of `tile_width x tile_height`
    pub const fn new(tile_width: u32, tile_height: u32) -> Self {
        Self {
            tile_width,
            tile_height,
        }
    }

    /// Lay `tiles` out row by row, padding or truncating to fill the grid
    ///
    /// With `serpentine` every odd row is laid out right to left.
    ///
    /// # Errors
    ///
    /// Returns an error if a tile has the wrong size
    pub fn compose(
        &self,
        grid: Grid,
        tiles: &[&Tile],
        serpentine: bool,
        progress: &dyn ProgressSink,
    ) -> Result<(Mosaic, CompositionReport)> {
        let total = grid.cells();
        let report = CompositionReport {
            padded: total.saturating_sub(tiles.len()),
            dropped: tiles.len().saturating_sub(total),
        };
        if report.padded > 0 {
            tracing::info!("{} transparent tiles will be added to the grid", report.padded);
        } else if report.dropped > 0 {
            tracing::info!("{} tiles will be dropped from the grid", report.dropped);
        }

        let mut slots: Vec<Option<&Tile>> = tiles.iter().copied().take(total).map(Some).collect();
        slots.resize(total, None);
        if serpentine {
            for row in slots.chunks_mut(grid.cols).skip(1).step_by(2) {
                row.reverse();
            }
        }

        let mut image = self.blank_canvas(grid);
        let mut info = TileInfo::background(grid);
        progress.start("Aligning tiles", total as u64);
        for (index, slot) in slots.iter().enumerate() {
            if let Some(tile) = slot {
                let (row, col) = (index / grid.cols, index % grid.cols);
                self.paint(&mut image, row, col, tile)?;
                info.set(row, col, &tile.label);
            }
            progress.advance(1);
        }
        progress.finish();

        Ok((Mosaic { image, info }, report))
    }

    /// Paint `tiles[k]` into the k-th selected cell; all other cells stay transparent
    ///
    /// # Errors
    ///
    /// Returns an error if the tile count differs from the selection size or a
    /// tile has the wrong size
    pub fn compose_masked(
        &self,
        grid: Grid,
        tiles: &[&Tile],
        selection: &CellSelection,
        progress: &dyn ProgressSink,
    ) -> Result<Mosaic> {
        if tiles.len() != selection.len() {
            return Err(computation_error(
                "masked composition",
                &format!(
                    "{} tiles for {} selected cells",
                    tiles.len(),
                    selection.len()
                ),
            ));
        }

        let mut image = self.blank_canvas(grid);
        let mut info = TileInfo::background(grid);
        progress.start("Aligning tiles", tiles.len() as u64);
        for (tile, (row, col)) in tiles.iter().zip(selection.cells()) {
            self.paint(&mut image, row, col, tile)?;
            info.set(row, col, &tile.label);
            progress.advance(1);
        }
        progress.finish();

        Ok(Mosaic { image, info })
    }

    fn blank_canvas(&self, grid: Grid) -> RgbaImage {
        let (width, height) = grid.collage_size(self.tile_width, self.tile_height);
        RgbaImage::from_pixel(width, height, BACKGROUND_PIXEL)
    }

    fn paint(&self, canvas: &mut RgbaImage, row: usize, col: usize, tile: &Tile) -> Result<()> {
        if tile.pixels.dimensions() != (self.tile_width, self.tile_height) {
            return Err(MosaicError::InvalidSourceData {
                reason: format!(
                    "tile '{}' is {}x{}, expected {}x{}",
                    tile.label,
                    tile.width(),
                    tile.height(),
                    self.tile_width,
                    self.tile_height
                ),
            });
        }
        let x0 = col as u32 * self.tile_width;
        let y0 = row as u32 * self.tile_height;
        for (x, y, p) in tile.pixels.enumerate_pixels() {
            canvas.put_pixel(x0 + x, y0 + y, Rgba([p[0], p[1], p[2], 255]));
        }
        Ok(())
    }
}
