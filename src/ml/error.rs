use thiserror::Error;

/// Errors raised by metric and loss computations.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    /// Invalid construction parameters.
    #[error("Invalid metric configuration: {0}")]
    Config(String),
    /// Prediction and target arrays disagree on shape.
    #[error("Shape mismatch: predicted {predicted:?} vs target {target:?}")]
    ShapeMismatch {
        /// Shape of the prediction array.
        predicted: Vec<usize>,
        /// Shape of the target array.
        target: Vec<usize>,
    },
    /// A predicted label fell outside `[0, num_classes)` for a scored pixel.
    #[error("Predicted label {label} is outside [0, {num_classes})")]
    LabelOutOfRange {
        /// Offending label.
        label: i64,
        /// Number of classes of the receiving matrix.
        num_classes: usize,
    },
    /// Two accumulators with different class counts were combined.
    #[error("Class count mismatch: {left} vs {right}")]
    ClassCountMismatch {
        /// Class count of the receiver.
        left: usize,
        /// Class count of the argument.
        right: usize,
    },
    /// Labels were supplied where scores were expected, or the reverse.
    #[error("Expected {expected} predictions, got {actual}")]
    PredictionKind {
        /// Kind the metric was configured for.
        expected: &'static str,
        /// Kind that was supplied.
        actual: &'static str,
    },
    /// The class axis does not exist on the score array.
    #[error("Class axis {axis} out of range for array of rank {ndim}")]
    ClassAxis {
        /// Requested axis.
        axis: usize,
        /// Rank of the score array.
        ndim: usize,
    },
}
