use ndarray::{Array2, ArrayView, Dimension};

use crate::ml::MetricError;

/// Lower bound on a row sum when normalizing, so empty rows stay at zero.
pub const NORMALIZE_EPSILON: f64 = 1e-12;

/// Confusion matrix for a `K`-class labelling task.
///
/// Rows are ground-truth classes and columns are predicted classes. Counts only
/// grow until [`ConfusionMatrix::reset`] is called.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Array2<u64>,
}

/// Snapshot returned by [`ConfusionMatrix::value`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfusionValue {
    /// Raw co-occurrence counts.
    Counts(Array2<u64>),
    /// Counts with each row divided by its row sum.
    Normalized(Array2<f64>),
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(num_classes: usize) -> Result<Self, MetricError> {
        if num_classes == 0 {
            return Err(MetricError::Config("num_classes must be > 0".to_string()));
        }
        Ok(Self {
            num_classes,
            counts: Array2::zeros((num_classes, num_classes)),
        })
    }

    /// Wrap an existing square count matrix.
    pub fn from_counts(counts: Array2<u64>) -> Result<Self, MetricError> {
        let (rows, cols) = counts.dim();
        if rows == 0 || rows != cols {
            return Err(MetricError::Config(format!(
                "confusion counts must be a non-empty square matrix, got {rows}x{cols}"
            )));
        }
        Ok(Self {
            num_classes: rows,
            counts,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Zero every cell.
    pub fn reset(&mut self) {
        self.counts.fill(0);
    }

    /// Accumulate one batch of predicted/ground-truth labels.
    ///
    /// Both arrays are walked in logical order. Pixels whose target is outside
    /// `[0, num_classes)` are dropped from both sides. The matrix is left
    /// untouched when an error is returned.
    pub fn add<D: Dimension>(
        &mut self,
        predicted: ArrayView<'_, i64, D>,
        target: ArrayView<'_, i64, D>,
    ) -> Result<(), MetricError> {
        if predicted.shape() != target.shape() {
            return Err(MetricError::ShapeMismatch {
                predicted: predicted.shape().to_vec(),
                target: target.shape().to_vec(),
            });
        }
        let k = self.num_classes as i64;
        let in_range = |label: i64| (0..k).contains(&label);

        let mut valid = 0u64;
        for (&pred, &truth) in predicted.iter().zip(target.iter()) {
            if !in_range(truth) {
                continue;
            }
            if !in_range(pred) {
                return Err(MetricError::LabelOutOfRange {
                    label: pred,
                    num_classes: self.num_classes,
                });
            }
            valid += 1;
        }

        for (&pred, &truth) in predicted.iter().zip(target.iter()) {
            if in_range(truth) {
                self.counts[[truth as usize, pred as usize]] += 1;
            }
        }
        tracing::trace!(
            valid,
            dropped = target.len() as u64 - valid,
            "Accumulated confusion batch"
        );
        Ok(())
    }

    /// Add another matrix's counts into this one.
    pub fn merge(&mut self, other: &ConfusionMatrix) -> Result<(), MetricError> {
        if other.num_classes != self.num_classes {
            return Err(MetricError::ClassCountMismatch {
                left: self.num_classes,
                right: other.num_classes,
            });
        }
        self.counts += &other.counts;
        Ok(())
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[[truth, predicted]]
    }

    /// Sum of all cells, i.e. the number of scored pixels.
    pub fn total(&self) -> u64 {
        self.counts.sum()
    }

    pub fn counts(&self) -> &Array2<u64> {
        &self.counts
    }

    /// Row-normalized copy of the counts. All-zero rows stay zero.
    pub fn normalized(&self) -> Array2<f64> {
        let mut out = self.counts.mapv(|count| count as f64);
        for mut row in out.rows_mut() {
            let denom = row.sum().max(NORMALIZE_EPSILON);
            row.mapv_inplace(|value| value / denom);
        }
        out
    }

    /// Snapshot of the accumulated counts, row-normalized when asked. The
    /// counts themselves are never modified.
    pub fn value(&self, normalized: bool) -> ConfusionValue {
        if normalized {
            ConfusionValue::Normalized(self.normalized())
        } else {
            ConfusionValue::Counts(self.counts.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3, array};

    #[test]
    fn counts_index_truth_then_prediction() {
        let mut cm = ConfusionMatrix::new(3).unwrap();
        let predicted = array![0i64, 1, 2, 2];
        let target = array![0i64, 2, 2, 1];
        cm.add(predicted.view(), target.view()).unwrap();
        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(2, 1), 1);
        assert_eq!(cm.get(2, 2), 1);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.total(), 4);
    }

    #[test]
    fn out_of_range_targets_are_dropped_from_both_sides() {
        let mut cm = ConfusionMatrix::new(2).unwrap();
        // The prediction paired with an ignored target may be anything.
        let predicted = array![[0i64, 1], [7, -3]];
        let target = array![[0i64, 1], [255, -1]];
        cm.add(predicted.view(), target.view()).unwrap();
        assert_eq!(cm.total(), 2);
        assert_eq!(cm.counts(), &array![[1u64, 0], [0, 1]]);
    }

    #[test]
    fn total_tracks_valid_pixels_across_batches() {
        let mut cm = ConfusionMatrix::new(4).unwrap();
        let mut expected = 0u64;
        for batch in 0..5i64 {
            let target = Array3::from_shape_fn((2, 3, 4), |(n, h, w)| {
                (n as i64 + h as i64 * 2 + w as i64 + batch) % 6 - 1
            });
            let predicted = target.mapv(|t| t.rem_euclid(4));
            expected += target.iter().filter(|&&t| (0..4).contains(&t)).count() as u64;
            cm.add(predicted.view(), target.view()).unwrap();
        }
        assert_eq!(cm.total(), expected);
    }

    #[test]
    fn shape_mismatch_fails_without_mutation() {
        let mut cm = ConfusionMatrix::new(2).unwrap();
        let predicted = Array1::<i64>::zeros(3);
        let target = Array1::<i64>::zeros(4);
        let err = cm.add(predicted.view(), target.view()).unwrap_err();
        assert_eq!(
            err,
            MetricError::ShapeMismatch {
                predicted: vec![3],
                target: vec![4],
            }
        );
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn invalid_prediction_for_scored_pixel_fails_without_mutation() {
        let mut cm = ConfusionMatrix::new(2).unwrap();
        let predicted = array![0i64, 5];
        let target = array![0i64, 1];
        let err = cm.add(predicted.view(), target.view()).unwrap_err();
        assert_eq!(
            err,
            MetricError::LabelOutOfRange {
                label: 5,
                num_classes: 2,
            }
        );
        assert_eq!(cm.total(), 0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut cm = ConfusionMatrix::new(2).unwrap();
        cm.add(array![0i64, 1, 1].view(), array![1i64, 1, 0].view())
            .unwrap();
        cm.reset();
        assert_eq!(cm.value(false), ConfusionValue::Counts(Array2::zeros((2, 2))));
    }

    #[test]
    fn normalized_rows_sum_to_one_and_empty_rows_stay_zero() {
        let cm = ConfusionMatrix::from_counts(array![[3u64, 1, 0], [0, 0, 0], [2, 2, 4]]).unwrap();
        let ConfusionValue::Normalized(norm) = cm.value(true) else {
            panic!("expected normalized view");
        };
        assert!((norm.row(0).sum() - 1.0).abs() < 1e-12);
        assert!((norm.row(2).sum() - 1.0).abs() < 1e-12);
        assert_eq!(norm.row(1).sum(), 0.0);
        assert!((norm[[0, 0]] - 0.75).abs() < 1e-12);
        // The underlying counts are untouched.
        assert_eq!(cm.get(0, 0), 3);
    }

    #[test]
    fn merge_matches_single_accumulation() {
        let target = Array1::from_iter((0..40i64).map(|i| i % 5 - 1));
        let predicted = Array1::from_iter((0..40i64).map(|i| (i * 7) % 4));

        let mut whole = ConfusionMatrix::new(4).unwrap();
        whole.add(predicted.view(), target.view()).unwrap();

        for split in [0usize, 1, 13, 39, 40] {
            let mut left = ConfusionMatrix::new(4).unwrap();
            let mut right = ConfusionMatrix::new(4).unwrap();
            left.add(
                predicted.slice(ndarray::s![..split]),
                target.slice(ndarray::s![..split]),
            )
            .unwrap();
            right
                .add(
                    predicted.slice(ndarray::s![split..]),
                    target.slice(ndarray::s![split..]),
                )
                .unwrap();
            let mut merged = right.clone();
            merged.merge(&left).unwrap();
            left.merge(&right).unwrap();
            assert_eq!(left, whole);
            assert_eq!(merged, whole);
        }
    }

    #[test]
    fn merge_rejects_different_class_counts() {
        let mut a = ConfusionMatrix::new(2).unwrap();
        let b = ConfusionMatrix::new(3).unwrap();
        assert_eq!(
            a.merge(&b),
            Err(MetricError::ClassCountMismatch { left: 2, right: 3 })
        );
    }

    #[test]
    fn zero_classes_is_a_config_error() {
        assert!(matches!(
            ConfusionMatrix::new(0),
            Err(MetricError::Config(_))
        ));
        assert!(ConfusionMatrix::from_counts(Array2::zeros((2, 3))).is_err());
    }
}
