//! Differentiable soft-Dice loss for segmentation training loops.

use ndarray::{ArrayD, ArrayView, ArrayViewD, Axis, Dimension, Zip};
use serde::{Deserialize, Serialize};

use super::MetricError;
use super::labels::check_axis;
use super::metrics::IgnoreIndices;

fn default_smooth() -> f64 {
    1.0
}

fn default_class_axis() -> usize {
    1
}

/// Soft-Dice loss over per-class probabilities.
///
/// For every scored class `c`, with `t_c` the one-hot ground truth:
/// `dice_c = (2 * sum(p_c * t_c) + smooth) / (sum(p_c) + sum(t_c) + smooth)`.
/// The loss is the mean of `-ln(dice_c)` over scored classes. Pixels whose
/// target is outside `[0, C)` are masked out entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftDiceLoss {
    /// Additive smoothing applied to numerator and denominator.
    #[serde(default = "default_smooth")]
    pub smooth: f64,
    /// Axis of the probability array that holds the classes.
    #[serde(default = "default_class_axis")]
    pub class_axis: usize,
    /// Classes that contribute nothing to the loss.
    #[serde(default)]
    pub ignore_indices: IgnoreIndices,
}

impl Default for SoftDiceLoss {
    fn default() -> Self {
        Self {
            smooth: default_smooth(),
            class_axis: default_class_axis(),
            ignore_indices: IgnoreIndices::none(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ClassStats {
    intersection: f64,
    pred_sum: f64,
    target_sum: f64,
}

impl ClassStats {
    fn numerator(&self, smooth: f64) -> f64 {
        2.0 * self.intersection + smooth
    }

    fn denominator(&self, smooth: f64) -> f64 {
        self.pred_sum + self.target_sum + smooth
    }
}

impl SoftDiceLoss {
    /// Soft Dice of each class; ignored classes report NaN.
    pub fn per_class_dice<D: Dimension, E: Dimension>(
        &self,
        probs: ArrayView<'_, f32, D>,
        target: ArrayView<'_, i64, E>,
    ) -> Result<Vec<f64>, MetricError> {
        let probs = probs.into_dyn();
        let target = target.into_dyn();
        let num_classes = self.check_inputs(&probs, &target)?;
        Ok((0..num_classes)
            .map(|class_idx| {
                if self.ignore_indices.contains(class_idx) {
                    return f64::NAN;
                }
                let stats = self.class_stats(&probs, &target, class_idx, num_classes);
                stats.numerator(self.smooth) / stats.denominator(self.smooth)
            })
            .collect())
    }

    /// Mean of `-ln(dice_c)` over the classes that are not ignored.
    pub fn compute<D: Dimension, E: Dimension>(
        &self,
        probs: ArrayView<'_, f32, D>,
        target: ArrayView<'_, i64, E>,
    ) -> Result<f64, MetricError> {
        let dice = self.per_class_dice(probs, target)?;
        let scored = dice.iter().filter(|value| !value.is_nan()).count();
        let total: f64 = dice
            .iter()
            .filter(|value| !value.is_nan())
            .map(|value| -value.ln())
            .sum();
        Ok(total / scored as f64)
    }

    /// Gradient of [`SoftDiceLoss::compute`] with respect to `probs`.
    pub fn gradient<D: Dimension, E: Dimension>(
        &self,
        probs: ArrayView<'_, f32, D>,
        target: ArrayView<'_, i64, E>,
    ) -> Result<ArrayD<f32>, MetricError> {
        let probs = probs.into_dyn();
        let target = target.into_dyn();
        let num_classes = self.check_inputs(&probs, &target)?;
        let scored = (0..num_classes)
            .filter(|&class_idx| !self.ignore_indices.contains(class_idx))
            .collect::<Vec<_>>();
        let scale = 1.0 / scored.len() as f64;
        let k = num_classes as i64;

        let mut grad = ArrayD::<f32>::zeros(probs.raw_dim());
        for &class_idx in &scored {
            let stats = self.class_stats(&probs, &target, class_idx, num_classes);
            let numerator = stats.numerator(self.smooth);
            let denominator = stats.denominator(self.smooth);
            let mut lane = grad.index_axis_mut(Axis(self.class_axis), class_idx);
            // d(-ln dice)/dp = 1/den - 2t/num
            Zip::from(&mut lane).and(&target).for_each(|g, &t| {
                if !(0..k).contains(&t) {
                    return;
                }
                let one_hot = if t == class_idx as i64 { 1.0 } else { 0.0 };
                *g = ((1.0 / denominator - 2.0 * one_hot / numerator) * scale) as f32;
            });
        }
        Ok(grad)
    }

    fn check_inputs(
        &self,
        probs: &ArrayViewD<'_, f32>,
        target: &ArrayViewD<'_, i64>,
    ) -> Result<usize, MetricError> {
        if !self.smooth.is_finite() || self.smooth <= 0.0 {
            return Err(MetricError::Config(format!(
                "smooth must be finite and > 0, got {}",
                self.smooth
            )));
        }
        check_axis(self.class_axis, probs.ndim())?;
        let mut expected = probs.shape().to_vec();
        let num_classes = expected.remove(self.class_axis);
        if expected.as_slice() != target.shape() {
            return Err(MetricError::ShapeMismatch {
                predicted: probs.shape().to_vec(),
                target: target.shape().to_vec(),
            });
        }
        if num_classes == 0 {
            return Err(MetricError::Config("probabilities have no classes".to_string()));
        }
        self.ignore_indices.validate(num_classes)?;
        if (0..num_classes).all(|class_idx| self.ignore_indices.contains(class_idx)) {
            return Err(MetricError::Config("every class is ignored".to_string()));
        }
        Ok(num_classes)
    }

    fn class_stats(
        &self,
        probs: &ArrayViewD<'_, f32>,
        target: &ArrayViewD<'_, i64>,
        class_idx: usize,
        num_classes: usize,
    ) -> ClassStats {
        let k = num_classes as i64;
        let lane = probs.index_axis(Axis(self.class_axis), class_idx);
        let mut stats = ClassStats::default();
        Zip::from(&lane).and(target).for_each(|&p, &t| {
            if !(0..k).contains(&t) {
                return;
            }
            let p = p as f64;
            stats.pred_sum += p;
            if t == class_idx as i64 {
                stats.intersection += p;
                stats.target_sum += 1.0;
            }
        });
        stats
    }
}
