//! Input/output: command line, configuration, errors, images, progress and video

/// Command-line parsing and the top-level runner
pub mod cli;
/// Defaults and runtime configuration
pub mod configuration;
/// Error types
pub mod error;
/// Image decoding, encoding and ledger output
pub mod image;
/// Progress reporting
pub mod progress;
/// Frame sources and the frame worker pool
pub mod video;
