//! Numeric kernels: colorspaces, distance metrics and the backends that evaluate them

/// Distance backends and kernel staging
pub mod backend;
/// Colorspace conversion for normalized RGB pixels
pub mod colorspace;
/// Distance metrics and memory-bounded cost matrix evaluation
pub mod distance;
/// `wgpu` compute backend
#[cfg(feature = "gpu")]
pub mod gpu;
