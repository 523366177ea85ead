//! Library exports for the command-line tools, benchmarks, and tests.
/// Application directory resolution.
pub mod app_dirs;
/// TOML configuration loading and validation.
pub mod config;
/// JSON label and score file loading.
pub mod label_file;
/// Tracing subscriber setup.
pub mod logging;
/// Segmentation metrics and losses.
pub mod ml;
