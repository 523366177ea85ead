//! Integration tests for Dice scoring on the synthetic block ground truth.

use ndarray::{Array2, Axis, s};
use rand::SeedableRng;
use rand::rngs::StdRng;

use segmetrics::ml::metrics::{
    ConfusionMatrix, DiceCoefficient, DiceOptions, DiceScore, IgnoreIndices,
};
use segmetrics::ml::synthetic::{GRID_CLASSES, GRID_SIZE, block_ground_truth, random_labels};

fn label_metric(ignore_indices: IgnoreIndices) -> DiceCoefficient {
    DiceCoefficient::new(DiceOptions {
        num_classes: GRID_CLASSES,
        reduced_probs: true,
        ignore_indices,
        ..DiceOptions::default()
    })
    .unwrap()
}

fn score_random(seed: u64) -> DiceScore {
    let target = block_ground_truth();
    let mut rng = StdRng::seed_from_u64(seed);
    let pred = random_labels(&mut rng, target.dim(), GRID_CLASSES);
    let mut metric = label_metric(IgnoreIndices::none());
    metric.add(pred.view(), target.view()).unwrap();
    metric.value()
}

#[test]
fn random_prediction_scores_between_zero_and_half() {
    let score = score_random(0);
    assert!(score.mean > 0.0 && score.mean < 0.5, "mean = {}", score.mean);
    assert!(score.per_class.iter().all(|dice| *dice > 0.0 && *dice < 1.0));
    // Background dominates the grid, so it overlaps random labels the most.
    assert!(score.per_class[0] > score.per_class[1]);
    assert!(score.per_class[0] > score.per_class[2]);
}

#[test]
fn random_prediction_is_reproducible_for_a_seed() {
    assert_eq!(score_random(42), score_random(42));
    assert_ne!(score_random(42).per_class, score_random(43).per_class);
}

#[test]
fn perfect_prediction_on_grid_is_one() {
    let target = block_ground_truth();
    let mut metric = label_metric(IgnoreIndices::none());
    metric.add(target.view(), target.view()).unwrap();
    let score = metric.value();
    assert_eq!(score.per_class, vec![1.0; GRID_CLASSES]);
    assert_eq!(score.mean, 1.0);
}

#[test]
fn shifted_prediction_on_grid_is_zero() {
    let target = block_ground_truth();
    let pred = target.mapv(|label| (label + 1) % GRID_CLASSES as i64);
    let mut metric = label_metric(IgnoreIndices::none());
    metric.add(pred.view(), target.view()).unwrap();
    let score = metric.value();
    assert_eq!(score.per_class, vec![0.0; GRID_CLASSES]);
}

#[test]
fn ignoring_background_drops_it_from_the_mean() {
    let target = block_ground_truth();
    let mut rng = StdRng::seed_from_u64(0);
    let pred = random_labels(&mut rng, target.dim(), GRID_CLASSES);
    let mut metric = label_metric(IgnoreIndices::from(0));
    metric.add(pred.view(), target.view()).unwrap();
    let score = metric.value();
    assert!(score.per_class[0].is_nan());
    let expected = (score.per_class[1] + score.per_class[2]) / 2.0;
    assert!((score.mean - expected).abs() < 1e-12);
}

#[test]
fn void_pixels_are_not_counted() {
    let mut target = block_ground_truth();
    target.slice_mut(s![.., ..10]).fill(255);
    target.slice_mut(s![..5, ..]).fill(-1);
    let mut rng = StdRng::seed_from_u64(3);
    let pred = random_labels(&mut rng, target.dim(), GRID_CLASSES);
    let mut cm = ConfusionMatrix::new(GRID_CLASSES).unwrap();
    cm.add(pred.view(), target.view()).unwrap();
    let valid = target
        .iter()
        .filter(|&&label| (0..GRID_CLASSES as i64).contains(&label))
        .count() as u64;
    assert_eq!(cm.total(), valid);
    assert_eq!(valid, ((GRID_SIZE - 5) * (GRID_SIZE - 10)) as u64);
}

#[test]
fn sharded_accumulation_merges_to_the_same_matrix() {
    let target = block_ground_truth();
    let mut rng = StdRng::seed_from_u64(11);
    let pred: Array2<i64> = random_labels(&mut rng, target.dim(), GRID_CLASSES);

    let mut whole = label_metric(IgnoreIndices::none());
    whole.add(pred.view(), target.view()).unwrap();

    let shards = std::thread::scope(|scope| {
        let handles = pred
            .axis_chunks_iter(Axis(0), 50)
            .zip(target.axis_chunks_iter(Axis(0), 50))
            .map(|(pred_rows, target_rows)| {
                scope.spawn(move || {
                    let mut shard = label_metric(IgnoreIndices::none());
                    shard.add(pred_rows, target_rows).unwrap();
                    shard
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>()
    });

    let mut merged = label_metric(IgnoreIndices::none());
    for shard in shards.iter().rev() {
        merged.merge(shard).unwrap();
    }
    assert_eq!(merged.confusion(), whole.confusion());
    assert_eq!(merged.value(), whole.value());
}
