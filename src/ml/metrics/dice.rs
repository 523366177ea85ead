use ndarray::{Array2, ArrayView, ArrayViewD, Axis, Dimension};
use serde::{Deserialize, Serialize};

use super::confusion::ConfusionMatrix;
use crate::ml::MetricError;
use crate::ml::labels::{argmax_along, check_axis};

/// Class indices excluded from scoring.
///
/// Deserializes from either a single integer or a list of integers, so both
/// `ignore_indices = 0` and `ignore_indices = [0, 3]` are accepted in TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IgnoreIndicesRepr", into = "Vec<usize>")]
pub struct IgnoreIndices(Vec<usize>);

#[derive(Deserialize)]
#[serde(untagged)]
enum IgnoreIndicesRepr {
    One(usize),
    Many(Vec<usize>),
}

impl From<IgnoreIndicesRepr> for IgnoreIndices {
    fn from(repr: IgnoreIndicesRepr) -> Self {
        match repr {
            IgnoreIndicesRepr::One(idx) => Self::from(idx),
            IgnoreIndicesRepr::Many(list) => Self::from(list),
        }
    }
}

impl From<IgnoreIndices> for Vec<usize> {
    fn from(indices: IgnoreIndices) -> Self {
        indices.0
    }
}

impl From<usize> for IgnoreIndices {
    fn from(idx: usize) -> Self {
        Self(vec![idx])
    }
}

impl From<Vec<usize>> for IgnoreIndices {
    fn from(mut list: Vec<usize>) -> Self {
        list.sort_unstable();
        list.dedup();
        Self(list)
    }
}

impl From<&[usize]> for IgnoreIndices {
    fn from(list: &[usize]) -> Self {
        Self::from(list.to_vec())
    }
}

impl IgnoreIndices {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, class_idx: usize) -> bool {
        self.0.binary_search(&class_idx).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Fail when any index cannot name one of `num_classes` classes.
    pub fn validate(&self, num_classes: usize) -> Result<(), MetricError> {
        match self.0.iter().find(|&&idx| idx >= num_classes) {
            Some(idx) => Err(MetricError::Config(format!(
                "ignore index {idx} is outside [0, {num_classes})"
            ))),
            None => Ok(()),
        }
    }
}

fn default_class_axis() -> usize {
    1
}

/// Construction options for [`DiceCoefficient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceOptions {
    /// Number of classes scored by the metric.
    pub num_classes: usize,
    /// Predictions are already class labels rather than per-class scores.
    pub reduced_probs: bool,
    /// Score the row-normalized confusion matrix instead of raw counts.
    pub normalized: bool,
    /// Classes excluded from scoring.
    pub ignore_indices: IgnoreIndices,
    /// Axis of the score array that holds the classes.
    #[serde(default = "default_class_axis")]
    pub class_axis: usize,
}

impl Default for DiceOptions {
    fn default() -> Self {
        Self {
            num_classes: 2,
            reduced_probs: false,
            normalized: false,
            ignore_indices: IgnoreIndices::none(),
            class_axis: default_class_axis(),
        }
    }
}

/// A batch of predictions handed to [`DiceCoefficient::add`].
#[derive(Debug, Clone)]
pub enum Prediction<'a> {
    /// Discrete class labels, same shape as the target.
    Labels(ArrayViewD<'a, i64>),
    /// Per-class scores (probabilities or logits) with a class axis.
    Scores(ArrayViewD<'a, f32>),
}

impl Prediction<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Prediction::Labels(_) => "label",
            Prediction::Scores(_) => "score",
        }
    }
}

impl<'a, D: Dimension> From<ArrayView<'a, i64, D>> for Prediction<'a> {
    fn from(view: ArrayView<'a, i64, D>) -> Self {
        Prediction::Labels(view.into_dyn())
    }
}

impl<'a, D: Dimension> From<ArrayView<'a, f32, D>> for Prediction<'a> {
    fn from(view: ArrayView<'a, f32, D>) -> Self {
        Prediction::Scores(view.into_dyn())
    }
}

/// Mean and per-class Dice coefficients.
///
/// Classes absent from both prediction and ground truth, and ignored classes,
/// report NaN. NaN serializes as `null` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiceScore {
    pub mean: f64,
    pub per_class: Vec<f64>,
}

/// Multi-class Dice coefficient accumulated through a confusion matrix.
#[derive(Debug, Clone)]
pub struct DiceCoefficient {
    options: DiceOptions,
    confusion: ConfusionMatrix,
}

impl DiceCoefficient {
    pub fn new(options: DiceOptions) -> Result<Self, MetricError> {
        let confusion = ConfusionMatrix::new(options.num_classes)?;
        options.ignore_indices.validate(options.num_classes)?;
        if options.ignore_indices.as_slice().len() == options.num_classes {
            tracing::warn!("Every class is ignored; Dice values will all be NaN");
        }
        Ok(Self { options, confusion })
    }

    pub fn options(&self) -> &DiceOptions {
        &self.options
    }

    pub fn confusion(&self) -> &ConfusionMatrix {
        &self.confusion
    }

    pub fn reset(&mut self) {
        self.confusion.reset();
    }

    /// Accumulate one batch.
    ///
    /// Labels are expected when `reduced_probs` is set, scores otherwise. Scores
    /// are reduced with an arg-max along the configured class axis.
    pub fn add<'a, D: Dimension>(
        &mut self,
        pred: impl Into<Prediction<'a>>,
        target: ArrayView<'_, i64, D>,
    ) -> Result<(), MetricError> {
        let pred = pred.into();
        let target = target.into_dyn();
        match (self.options.reduced_probs, pred) {
            (true, Prediction::Labels(labels)) => self.confusion.add(labels, target),
            (false, Prediction::Scores(scores)) => {
                let labels = self.reduce_scores(&scores)?;
                self.confusion.add(labels.view(), target)
            }
            (reduced, other) => Err(MetricError::PredictionKind {
                expected: if reduced { "label" } else { "score" },
                actual: other.kind(),
            }),
        }
    }

    /// Combine counts accumulated by another instance built with the same options.
    pub fn merge(&mut self, other: &DiceCoefficient) -> Result<(), MetricError> {
        if self.options.num_classes == other.options.num_classes && self.options != other.options {
            return Err(MetricError::Config(format!(
                "cannot merge Dice metrics with different options: {:?} vs {:?}",
                self.options, other.options
            )));
        }
        self.confusion.merge(&other.confusion)
    }

    /// Derive the Dice scores from the counts accumulated so far.
    pub fn value(&self) -> DiceScore {
        let mut matrix = if self.options.normalized {
            self.confusion.normalized()
        } else {
            self.confusion.counts().mapv(|count| count as f64)
        };
        let ignore = &self.options.ignore_indices;
        for &idx in ignore.as_slice() {
            matrix.row_mut(idx).fill(0.0);
            matrix.column_mut(idx).fill(0.0);
        }

        let per_class = dice_per_class(&matrix)
            .into_iter()
            .enumerate()
            .map(|(class_idx, dice)| if ignore.contains(class_idx) { f64::NAN } else { dice })
            .collect::<Vec<_>>();
        let defined = per_class
            .iter()
            .copied()
            .filter(|dice| !dice.is_nan())
            .collect::<Vec<_>>();
        let mean = if defined.is_empty() {
            f64::NAN
        } else {
            defined.iter().sum::<f64>() / defined.len() as f64
        };
        DiceScore { mean, per_class }
    }

    fn reduce_scores(&self, scores: &ArrayViewD<'_, f32>) -> Result<ndarray::ArrayD<i64>, MetricError> {
        let axis = self.options.class_axis;
        check_axis(axis, scores.ndim())?;
        let classes = scores.len_of(Axis(axis));
        if classes != self.options.num_classes {
            return Err(MetricError::ClassCountMismatch {
                left: self.options.num_classes,
                right: classes,
            });
        }
        argmax_along(scores, axis)
    }
}

/// `2TP / (2TP + FP + FN)` for each class of a `[truth][predicted]` matrix.
///
/// `0 / 0` is left as NaN.
pub fn dice_per_class(matrix: &Array2<f64>) -> Vec<f64> {
    let true_positive = matrix.diag();
    let predicted_total = matrix.sum_axis(Axis(0));
    let truth_total = matrix.sum_axis(Axis(1));
    true_positive
        .iter()
        .zip(predicted_total.iter().zip(truth_total.iter()))
        .map(|(&tp, (&col, &row))| {
            let false_positive = col - tp;
            let false_negative = row - tp;
            2.0 * tp / (2.0 * tp + false_positive + false_negative)
        })
        .collect()
}
