//! Block geometry and projection of images into feature vectors
//!
//! A destination image is cut into `cols x rows` blocks of identical size and
//! every tile is shrunk to that same block size, so one flattened block and one
//! flattened tile are directly comparable under a distance metric.

use image::{Rgb, RgbImage};
use image::imageops;
use ndarray::Array2;

use crate::algorithm::salient::CellSelection;
use crate::math::colorspace::Colorspace;
use crate::spatial::grid::Grid;
use crate::spatial::tiles::{RESIZE_FILTER, Tile};

/// Channels per pixel in a feature vector
pub const CHANNELS: usize = 3;

/// Pixel size of one destination block together with the grid it tiles
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockGeometry {
    /// Tile grid
    pub grid: Grid,
    /// Block width in pixels
    pub block_width: u32,
    /// Block height in pixels
    pub block_height: u32,
}

impl BlockGeometry {
    /// Derive block size from the destination and grid
    ///
    /// Sides are `round(dest / grid)`. If either exceeds the tile side both are
    /// scaled by the smaller of the tile-to-block ratios so neither exceeds it.
    pub fn compute(dest_w: u32, dest_h: u32, grid: Grid, tile_w: u32, tile_h: u32) -> Self {
        let mut bw = (f64::from(dest_w) / grid.cols as f64).round();
        let mut bh = (f64::from(dest_h) / grid.rows as f64).round();

        if bw > f64::from(tile_w) || bh > f64::from(tile_h) {
            let scale = (f64::from(tile_w) / bw).min(f64::from(tile_h) / bh);
            bw = (bw * scale).floor();
            bh = (bh * scale).floor();
        }

        let geometry = Self::from_blocks(grid, bw as u32, bh as u32);
        tracing::info!(
            block_width = geometry.block_width,
            block_height = geometry.block_height,
            "block size"
        );
        let (tw, th) = geometry.target_size();
        tracing::info!("resizing dest image from {dest_w}x{dest_h} to {tw}x{th}");
        geometry
    }

    /// Geometry with explicit block sides, clamping zero sides to one pixel
    pub fn from_blocks(grid: Grid, block_width: u32, block_height: u32) -> Self {
        if block_width == 0 || block_height == 0 {
            tracing::warn!(
                block_width,
                block_height,
                "destination is smaller than the grid, using 1px blocks"
            );
        }
        Self {
            grid,
            block_width: block_width.max(1),
            block_height: block_height.max(1),
        }
    }

    /// Length of a flattened block feature vector
    pub const fn feature_len(&self) -> usize {
        self.block_width as usize * self.block_height as usize * CHANNELS
    }

    /// Size the destination is resized to before cutting blocks
    pub const fn target_size(&self) -> (u32, u32) {
        (
            self.grid.cols as u32 * self.block_width,
            self.grid.rows as u32 * self.block_height,
        )
    }
}

/// Turns tiles and destination images into rows of feature vectors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockProjector {
    geometry: BlockGeometry,
    colorspace: Colorspace,
}

impl BlockProjector {
    /// Projector for `geometry`, comparing in `colorspace`
    pub const fn new(geometry: BlockGeometry, colorspace: Colorspace) -> Self {
        Self {
            geometry,
            colorspace,
        }
    }

    /// Geometry in use
    pub const fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    /// Colorspace in use
    pub const fn colorspace(&self) -> Colorspace {
        self.colorspace
    }

    /// One feature row per tile, each tile shrunk to the block size
    pub fn project_tiles(&self, tiles: &[&Tile]) -> Array2<f32> {
        let BlockGeometry {
            block_width,
            block_height,
            ..
        } = self.geometry;
        let len = self.geometry.feature_len();
        let mut out = Array2::zeros((tiles.len(), len));
        for (tile, mut row) in tiles.iter().zip(out.rows_mut()) {
            let block = imageops::resize(&tile.pixels, block_width, block_height, RESIZE_FILTER);
            for (value, feature) in row.iter_mut().zip(self.features(&block)) {
                *value = feature;
            }
        }
        out
    }

    /// Resize a destination to the block grid's pixel size
    pub fn resize_destination(&self, dest: &RgbImage) -> RgbImage {
        let (tw, th) = self.geometry.target_size();
        if dest.dimensions() == (tw, th) {
            dest.clone()
        } else {
            imageops::resize(dest, tw, th, RESIZE_FILTER)
        }
    }

    /// One feature row per grid cell, in row-major cell order
    pub fn project_destination(&self, dest: &RgbImage) -> Array2<f32> {
        let resized = self.resize_destination(dest);
        let grid = self.geometry.grid;
        let cells: Vec<(usize, usize)> = (0..grid.rows)
            .flat_map(|r| (0..grid.cols).map(move |c| (r, c)))
            .collect();
        self.gather(&resized, &cells)
    }

    /// Feature rows for the selected cells only, in selection order
    ///
    /// `dest` is resized to the grid's pixel size if it isn't already.
    pub fn project_destination_masked(&self, dest: &RgbImage, selection: &CellSelection) -> Array2<f32> {
        let resized = self.resize_destination(dest);
        let cells: Vec<(usize, usize)> = selection.cells().collect();
        tracing::info!(
            "salient blocks/total blocks = {}/{}",
            cells.len(),
            self.geometry.grid.cells()
        );
        self.gather(&resized, &cells)
    }

    fn convert_pixel(&self, p: &Rgb<u8>) -> [f32; 3] {
        self.colorspace.convert([
            f32::from(p[0]) / 255.0,
            f32::from(p[1]) / 255.0,
            f32::from(p[2]) / 255.0,
        ])
    }

    fn features<'a>(&'a self, img: &'a RgbImage) -> impl Iterator<Item = f32> + 'a {
        img.pixels().flat_map(move |p| self.convert_pixel(p))
    }

    fn gather(&self, img: &RgbImage, cells: &[(usize, usize)]) -> Array2<f32> {
        let bw = self.geometry.block_width as usize;
        let bh = self.geometry.block_height as usize;
        let width = img.width() as usize;
        let converted: Vec<[f32; 3]> = img.pixels().map(|p| self.convert_pixel(p)).collect();

        let mut out = Array2::zeros((cells.len(), self.geometry.feature_len()));
        for (&(r, c), mut row) in cells.iter().zip(out.rows_mut()) {
            let mut k = 0;
            for y in r * bh..(r + 1) * bh {
                let start = y * width + c * bw;
                for pixel in converted.get(start..start + bw).unwrap_or(&[]) {
                    for &channel in pixel {
                        if let Some(slot) = row.get_mut(k) {
                            *slot = channel;
                        }
                        k += 1;
                    }
                }
            }
        }
        out
    }
}
