//! Assignment of tiles to grid cells

/// Policy engines turning destinations into mosaics
pub mod executor;
/// Greedy approximate linear assignment
pub mod greedy;
/// Exact linear assignment by shortest augmenting paths
pub mod jonker_volgenant;
/// Salient cell selection and block shrinking
pub mod salient;
/// Nearest, balanced and dithered unfair assignment
pub mod unfair;
