//! Evaluation metrics for per-pixel classification.
//!
//! Counts are gathered in a [`ConfusionMatrix`]; [`DiceCoefficient`] layers the
//! Dice score on top of it.

mod confusion;
mod dice;

pub use confusion::{ConfusionMatrix, ConfusionValue, NORMALIZE_EPSILON};
pub use dice::{
    DiceCoefficient, DiceOptions, DiceScore, IgnoreIndices, Prediction, dice_per_class,
};
