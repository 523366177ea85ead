//! Segmentation metric and loss building blocks.
//!
//! These utilities operate on `ndarray` views of label and score arrays and keep
//! no global state; accumulators are plain values owned by the caller.

mod error;
pub mod labels;
pub mod loss;
pub mod metrics;
pub mod synthetic;

pub use error::MetricError;
