//! Photomosaic engine: assigns a pool of tile images to the cells of a grid so
//! the tiled result approximates a destination image or every frame of a video
//!
//! Tiles can be used fairly (every tile an equal number of times, solved as a
//! linear assignment problem), unfairly (nearest tile per block, optionally
//! balanced by usage and dithered), or only inside salient or opaque regions.

/// Assignment solvers and the per-policy mosaic engines
pub mod algorithm;
/// Saliency maps and collage sort keys
pub mod analysis;
/// Command line, configuration, errors, image and video I/O
pub mod io;
/// Colorspaces, distance metrics and numeric backends
pub mod math;
/// Grid planning, tiles, block projection and composition
pub mod spatial;

pub use io::error::{MosaicError, Result};
