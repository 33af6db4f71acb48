//! Spatial layout of a mosaic
//!
//! This module contains:
//! - Grid planning
//! - Tile loading and duplication
//! - Block geometry and feature projection
//! - Composition and blending of the final image

/// Blending with the destination image
pub mod blend;
/// Block geometry and feature projection
pub mod blocks;
/// Canvas composition and tile-info ledger
pub mod composer;
/// Grid size planning
pub mod grid;
/// Tile pool loading and duplication
pub mod tiles;

pub use grid::Grid;
