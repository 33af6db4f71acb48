//! Tile pool loading, normalization and duplication
//!
//! Tiles are decoded from a directory on a rayon pool sized by the worker count,
//! brought to one common size and kept in directory order. Files that fail to decode are
//! skipped and counted. Fair policies duplicate the pool by index so that every
//! grid cell gets exactly one tile instance.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rayon::prelude::*;

use crate::io::error::{MosaicError, Result, computation_error, invalid_parameter};
use crate::io::progress::ProgressSink;

/// Filter used for every tile and block resize
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// One tile image and the file it came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    /// Pixels at the pool's tile size
    pub pixels: RgbImage,
    /// Source path, written to the tile-info ledger
    pub label: String,
}

impl Tile {
    /// Wrap already sized pixels
    pub fn new(pixels: RgbImage, label: impl Into<String>) -> Self {
        Self {
            pixels,
            label: label.into(),
        }
    }

    /// Tile width in pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Tile height in pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Ordered set of equally sized tiles
#[derive(Clone, Debug, Default)]
pub struct TilePool {
    tiles: Vec<Tile>,
    failed: usize,
}

impl TilePool {
    /// Build a pool, checking that every tile has the same size
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is empty or tile sizes differ
    pub fn from_tiles(tiles: Vec<Tile>) -> Result<Self> {
        Self::with_failures(tiles, 0)
    }

    fn with_failures(tiles: Vec<Tile>, failed: usize) -> Result<Self> {
        let Some(first) = tiles.first() else {
            return Err(MosaicError::InvalidSourceData {
                reason: "no tile could be decoded".to_string(),
            });
        };
        let size = first.pixels.dimensions();
        if let Some(odd) = tiles.iter().find(|t| t.pixels.dimensions() != size) {
            return Err(MosaicError::InvalidSourceData {
                reason: format!(
                    "tile '{}' is {}x{}, expected {}x{}",
                    odd.label,
                    odd.width(),
                    odd.height(),
                    size.0,
                    size.1
                ),
            });
        }
        Ok(Self { tiles, failed })
    }

    /// Number of tiles
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether the pool holds no tiles
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Number of files skipped because they could not be decoded
    pub const fn failed(&self) -> usize {
        self.failed
    }

    /// Shared `(width, height)` of every tile
    pub fn tile_size(&self) -> (u32, u32) {
        self.tiles
            .first()
            .map_or((0, 0), |tile| tile.pixels.dimensions())
    }

    /// Tile at `index`
    pub fn get(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    /// Tiles in insertion order
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Resolve instance indices into tile references
    ///
    /// # Errors
    ///
    /// Returns an error if an index is out of range
    pub fn select(&self, indices: &[usize]) -> Result<Vec<&Tile>> {
        indices
            .iter()
            .map(|&i| {
                self.tiles.get(i).ok_or_else(|| MosaicError::Computation {
                    operation: "tile lookup",
                    reason: format!("tile index {i} out of range for {} tiles", self.len()),
                })
            })
            .collect()
    }

    /// Reorder tiles by `order`, a permutation of the pool's indices
    #[must_use]
    pub fn reordered(&self, order: &[usize]) -> Self {
        Self {
            tiles: order
                .iter()
                .filter_map(|&i| self.tiles.get(i).cloned())
                .collect(),
            failed: self.failed,
        }
    }
}

/// How tiles are brought to the target aspect ratio
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ResizeMode {
    /// Crop the largest centred region with the target ratio
    #[default]
    Center,
    /// Stretch to the target size
    Stretch,
    /// Scale to fit and pad with black
    Fit,
}

/// Quarter turn applied to tiles whose transposed ratio fits better
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// Never rotate
    #[default]
    Off,
    /// Rotate 90 degrees counterclockwise
    CounterClockwise,
    /// Rotate 90 degrees clockwise
    Clockwise,
}

impl Rotation {
    /// Map the `-1`, `0`, `1` command line flag
    ///
    /// # Errors
    ///
    /// Returns an error for any other value
    pub fn from_flag(flag: i8) -> Result<Self> {
        match flag {
            0 => Ok(Self::Off),
            1 => Ok(Self::CounterClockwise),
            -1 => Ok(Self::Clockwise),
            other => Err(invalid_parameter(
                "auto_rotate",
                &other,
                &"expected -1, 0 or 1",
            )),
        }
    }

    fn apply(self, img: &RgbImage) -> Option<RgbImage> {
        match self {
            Self::Off => None,
            Self::CounterClockwise => Some(imageops::rotate270(img)),
            Self::Clockwise => Some(imageops::rotate90(img)),
        }
    }
}

/// Requested tile size; a missing height is inferred from the tile files
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileSize {
    /// Tile width in pixels
    pub width: u32,
    /// Tile height in pixels
    pub height: Option<u32>,
}

impl TileSize {
    /// Parse the one or two values of the `--size` flag
    ///
    /// # Errors
    ///
    /// Returns an error unless one or two positive values are given
    pub fn from_values(values: &[u32]) -> Result<Self> {
        match values {
            [w] if *w > 0 => Ok(Self {
                width: *w,
                height: None,
            }),
            [w, h] if *w > 0 && *h > 0 => Ok(Self {
                width: *w,
                height: Some(*h),
            }),
            _ => Err(invalid_parameter(
                "size",
                &format!("{values:?}"),
                &"expected one or two positive pixel counts",
            )),
        }
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.height {
            Some(h) => write!(f, "{}x{h}", self.width),
            None => write!(f, "{}x?", self.width),
        }
    }
}

/// Bring a decoded image to exactly `size` using `mode`, rotating first if that preserves more area
pub fn prepare_tile(img: &RgbImage, size: (u32, u32), mode: ResizeMode, rotation: Rotation) -> RgbImage {
    let (tw, th) = size;
    let ratio = f64::from(tw) / f64::from(th);
    let (w, h) = img.dimensions();
    let (w, h) = (f64::from(w), f64::from(h));

    let rotated = if (h / w - ratio).abs() < (w / h - ratio).abs() {
        rotation.apply(img)
    } else {
        None
    };
    let img = rotated.as_ref().unwrap_or(img);

    match mode {
        ResizeMode::Stretch => imageops::resize(img, tw, th, RESIZE_FILTER),
        ResizeMode::Center => {
            let cropped = center_crop(img, ratio);
            imageops::resize(&cropped, tw, th, RESIZE_FILTER)
        }
        ResizeMode::Fit => letterbox(img, tw, th),
    }
}

// Largest centred region with width / height == ratio
fn center_crop(img: &RgbImage, ratio: f64) -> RgbImage {
    let (w, h) = img.dimensions();
    let (cw, ch) = if f64::from(w) / f64::from(h) > ratio {
        (((f64::from(h) * ratio).round() as u32).clamp(1, w), h)
    } else {
        (w, ((f64::from(w) / ratio).round() as u32).clamp(1, h))
    };
    imageops::crop_imm(img, (w - cw) / 2, (h - ch) / 2, cw, ch).to_image()
}

fn letterbox(img: &RgbImage, tw: u32, th: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let aspect = f64::from(w) / f64::from(h);
    let target = f64::from(tw) / f64::from(th);
    let (nw, nh) = if target > aspect {
        (((f64::from(th) * aspect).round() as u32).clamp(1, tw), th)
    } else if target < aspect {
        (tw, ((f64::from(tw) / aspect).round() as u32).clamp(1, th))
    } else {
        return imageops::resize(img, tw, th, RESIZE_FILTER);
    };
    let scaled = imageops::resize(img, nw, nh, RESIZE_FILTER);
    let mut canvas = RgbImage::from_pixel(tw, th, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &scaled,
        i64::from((tw - nw) / 2),
        i64::from((th - nh) / 2),
    );
    canvas
}

/// List regular files under `dir`, sorted by path
///
/// # Errors
///
/// Returns an error if `dir` is not a readable directory
pub fn scan_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MosaicError::InvalidSourceData {
            reason: format!("tile directory '{}' does not exist", dir.display()),
        });
    }
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| MosaicError::FileSystem {
            path: current.clone(),
            operation: "read directory",
            source: e,
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Infer the tile height for `width` from the most frequent aspect ratio
///
/// Ratios are compared as reduced fractions; ties go to the wider ratio.
/// Returns `None` when no dimensions are known.
pub fn infer_height(dimensions: &[(u32, u32)], width: u32) -> Option<u32> {
    let mut counts: HashMap<(u32, u32), usize> = HashMap::new();
    for &(w, h) in dimensions {
        if w == 0 || h == 0 {
            continue;
        }
        let d = gcd(w, h);
        *counts.entry((w / d, h / d)).or_default() += 1;
    }
    let ((rw, rh), _) = counts.into_iter().max_by(|(ra, ca), (rb, cb)| {
        ca.cmp(cb).then_with(|| {
            (u64::from(ra.0) * u64::from(rb.1)).cmp(&(u64::from(rb.0) * u64::from(ra.1)))
        })
    })?;
    let height = (f64::from(width) * f64::from(rh) / f64::from(rw)).round() as u32;
    Some(height.max(1))
}

fn build_thread_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| computation_error("tile reading", &format!("failed to build thread pool: {e}")))
}

/// Parallel tile loader
#[derive(Clone, Copy, Debug)]
pub struct TileReader {
    /// Requested tile size
    pub size: TileSize,
    /// Aspect ratio normalization
    pub resize: ResizeMode,
    /// Auto rotation
    pub rotation: Rotation,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Number of decoding threads
    pub workers: usize,
}

impl TileReader {
    /// Reader with default options for `size`
    pub const fn new(size: TileSize) -> Self {
        Self {
            size,
            resize: ResizeMode::Center,
            rotation: Rotation::Off,
            recursive: false,
            workers: 1,
        }
    }

    /// Decode and normalize every image file in `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory can't be read, the tile height can't
    /// be inferred, or no file decodes
    pub fn read(&self, dir: &Path, progress: &dyn ProgressSink) -> Result<TilePool> {
        tracing::info!(dir = %dir.display(), "scanning files");
        let files = scan_files(dir, self.recursive)?;
        let size = self.resolve_size(&files, progress)?;
        tracing::info!(width = size.0, height = size.1, "tile size");

        progress.start("Reading files", files.len() as u64);
        let decoded: Vec<Option<Tile>> = build_thread_pool(self.workers)?.install(|| {
            files
                .par_iter()
                .map(|path| {
                    let tile = self.read_one(path, size);
                    progress.advance(1);
                    tile
                })
                .collect()
        });
        progress.finish();

        let total = files.len();
        let tiles: Vec<Tile> = decoded.into_iter().flatten().collect();
        let failed = total - tiles.len();
        tracing::info!(
            read = tiles.len(),
            failed,
            "read {} images, {failed} files cannot be decoded as images",
            tiles.len()
        );
        TilePool::with_failures(tiles, failed)
    }

    fn resolve_size(&self, files: &[PathBuf], progress: &dyn ProgressSink) -> Result<(u32, u32)> {
        if let Some(height) = self.size.height {
            return Ok((self.size.width, height));
        }
        progress.start("Inferring size", files.len() as u64);
        let dimensions: Vec<(u32, u32)> = build_thread_pool(self.workers)?.install(|| {
            files
                .par_iter()
                .filter_map(|path| {
                    progress.advance(1);
                    image::image_dimensions(path).ok()
                })
                .collect()
        });
        progress.finish();

        let height = infer_height(&dimensions, self.size.width).ok_or_else(|| {
            MosaicError::InvalidSourceData {
                reason: "failed to infer tile size, no file has a readable image header"
                    .to_string(),
            }
        })?;
        tracing::info!(width = self.size.width, height, "inferred tile size");
        Ok((self.size.width, height))
    }

    fn read_one(&self, path: &Path, size: (u32, u32)) -> Option<Tile> {
        match image::open(path) {
            Ok(img) => {
                let pixels = prepare_tile(&img.to_rgb8(), size, self.resize, self.rotation);
                Some(Tile::new(pixels, path.to_string_lossy()))
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping undecodable file");
                None
            }
        }
    }
}

/// Accounting of how a pool was stretched to a required instance count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DuplicationReport {
    /// Tiles in the pool
    pub pool: usize,
    /// Instances produced
    pub total: usize,
    /// Times every tile is used at least
    pub full_copies: usize,
    /// Tiles used one extra time
    pub extra: usize,
    /// Tiles never used
    pub unused: usize,
}

/// Number of tile instances for a duplication factor, rounding halves to even
pub fn duplicated_total(pool: usize, dup: f64) -> usize {
    (pool as f64 * dup).round_ties_even().max(0.0) as usize
}

/// Stretch or truncate a pool of `pool` tiles to exactly `total` instance indices
///
/// With fewer instances than tiles the first `total` tiles are used once.
/// Otherwise every tile appears `total / pool` times followed by the first
/// `total % pool` tiles once more.
pub fn dup_to_meet_total(pool: usize, total: usize) -> (Vec<usize>, DuplicationReport) {
    if pool == 0 {
        return (
            Vec::new(),
            DuplicationReport {
                pool,
                total: 0,
                full_copies: 0,
                extra: 0,
                unused: 0,
            },
        );
    }

    if total < pool {
        tracing::info!(
            "{total} tiles will be used 1 time. {}/{pool} tiles will not be used",
            pool - total
        );
        return (
            (0..total).collect(),
            DuplicationReport {
                pool,
                total,
                full_copies: 0,
                extra: total,
                unused: pool - total,
            },
        );
    }

    let full_copies = total / pool;
    let extra = total % pool;
    let mut indices = Vec::with_capacity(total);
    for _ in 0..full_copies {
        indices.extend(0..pool);
    }
    indices.extend(0..extra);

    if extra > 0 {
        tracing::info!(
            "{} tiles will be used {full_copies} times. {extra} tiles will be used {} times. Total tiles: {pool}",
            pool - extra,
            full_copies + 1
        );
    } else {
        tracing::info!("Total tiles: {pool}. All of them will be used {full_copies} times");
    }

    (
        indices,
        DuplicationReport {
            pool,
            total,
            full_copies,
            extra,
            unused: 0,
        },
    )
}
