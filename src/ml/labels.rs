//! Conversions between per-class score arrays and discrete label arrays.

use ndarray::{ArrayD, ArrayView1, ArrayViewD, Axis};

use super::MetricError;

/// Reduce `scores` to class labels by taking the arg-max along `axis`.
///
/// The class axis is removed from the output shape. Ties resolve to the lowest
/// class index and NaN scores never win.
pub fn argmax_along(scores: &ArrayViewD<'_, f32>, axis: usize) -> Result<ArrayD<i64>, MetricError> {
    check_axis(axis, scores.ndim())?;
    Ok(scores.map_axis(Axis(axis), |lane| argmax(lane) as i64))
}

/// Numerically stable softmax over every lane along `axis`.
pub fn softmax_along(scores: &ArrayViewD<'_, f32>, axis: usize) -> Result<ArrayD<f32>, MetricError> {
    check_axis(axis, scores.ndim())?;
    let mut out = scores.to_owned();
    for mut lane in out.lanes_mut(Axis(axis)) {
        let len = lane.len();
        if len == 0 {
            continue;
        }
        let max = lane.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        if !max.is_finite() {
            lane.fill(1.0 / len as f32);
            continue;
        }
        let mut sum = 0.0f32;
        lane.mapv_inplace(|v| {
            let e = (v - max).exp();
            sum += e;
            e
        });
        if sum == 0.0 || !sum.is_finite() {
            lane.fill(1.0 / len as f32);
        } else {
            lane.mapv_inplace(|v| v / sum);
        }
    }
    Ok(out)
}

pub(crate) fn check_axis(axis: usize, ndim: usize) -> Result<(), MetricError> {
    if axis >= ndim {
        return Err(MetricError::ClassAxis { axis, ndim });
    }
    Ok(())
}

fn argmax(lane: ArrayView1<'_, f32>) -> usize {
    let mut best_idx = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (idx, &value) in lane.iter().enumerate() {
        if value > best_val {
            best_val = value;
            best_idx = idx;
        }
    }
    best_idx
}
