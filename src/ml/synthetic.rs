//! Synthetic label grids for demos and reproducibility checks.

use ndarray::{Array2, s};
use rand::Rng;

use super::MetricError;

/// Side length of the synthetic ground-truth grid.
pub const GRID_SIZE: usize = 224;
/// Smallest side length whose scaled blocks still hold pixels of every class.
pub const MIN_GRID_SIZE: usize = 8;
/// Number of classes drawn in the synthetic ground truth.
pub const GRID_CLASSES: usize = 3;

/// Square ground truth of background class 0 with a 50x50 block of class 1
/// and a 100x50 block of class 2.
pub fn block_ground_truth() -> Array2<i64> {
    blocks(GRID_SIZE)
}

/// [`block_ground_truth`] with the block offsets scaled to a `size x size` grid.
pub fn block_ground_truth_sized(size: usize) -> Result<Array2<i64>, MetricError> {
    if size < MIN_GRID_SIZE {
        return Err(MetricError::Config(format!(
            "grid size {size} is below the minimum of {MIN_GRID_SIZE}"
        )));
    }
    Ok(blocks(size))
}

fn blocks(size: usize) -> Array2<i64> {
    let at = |offset: usize| offset * size / GRID_SIZE;
    let mut target = Array2::<i64>::zeros((size, size));
    target.slice_mut(s![at(20)..at(70), at(20)..at(70)]).fill(1);
    target
        .slice_mut(s![at(100)..at(200), at(120)..at(170)])
        .fill(2);
    target
}

/// Uniformly random labels in `[0, num_classes)`.
pub fn random_labels<R: Rng + ?Sized>(
    rng: &mut R,
    shape: (usize, usize),
    num_classes: usize,
) -> Array2<i64> {
    let upper = num_classes.max(1) as i64;
    Array2::from_shape_simple_fn(shape, || rng.random_range(0..upper))
}
