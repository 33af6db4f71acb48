//! Image analysis feeding the mosaic pipeline

/// Saliency and transparency score maps
pub mod saliency;
/// Sort keys for plain collages
pub mod sorting;
