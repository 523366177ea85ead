//! Loading of label and score grids stored as nested JSON arrays.
//!
//! A file holds a single rectangular nested array of numbers, e.g.
//! `[[0, 1], [2, 2]]`. Its nesting depth is the array rank.

use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while loading a label or score file.
#[derive(Debug, Error)]
pub enum LabelFileError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Malformed array in {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

/// A prediction file's contents.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionGrid {
    /// Discrete labels with the target's rank.
    Labels(ArrayD<i64>),
    /// Per-class scores with one extra class axis.
    Scores(ArrayD<f32>),
}

/// Load a prediction file, treating it as scores when it has one more axis
/// than the target.
pub fn load_prediction(path: &Path, target_rank: usize) -> Result<PredictionGrid, LabelFileError> {
    let (shape, values) = load_nested(path)?;
    if shape.len() == target_rank + 1 {
        Ok(PredictionGrid::Scores(scores_from(path, shape, &values)?))
    } else {
        Ok(PredictionGrid::Labels(labels_from(path, shape, &values)?))
    }
}

/// Load integer class labels.
pub fn load_labels(path: &Path) -> Result<ArrayD<i64>, LabelFileError> {
    let (shape, values) = load_nested(path)?;
    labels_from(path, shape, &values)
}

/// Load per-class scores.
pub fn load_scores(path: &Path) -> Result<ArrayD<f32>, LabelFileError> {
    let (shape, values) = load_nested(path)?;
    scores_from(path, shape, &values)
}

fn labels_from(path: &Path, shape: Vec<usize>, values: &[Value]) -> Result<ArrayD<i64>, LabelFileError> {
    let labels = values
        .iter()
        .map(|value| match value.as_i64() {
            Some(label) => Ok(label),
            None => Err(format_error(path, format!("{value} is not an integer label"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    into_array(path, shape, labels)
}

fn scores_from(path: &Path, shape: Vec<usize>, values: &[Value]) -> Result<ArrayD<f32>, LabelFileError> {
    let scores = values
        .iter()
        .map(|value| match value.as_f64() {
            Some(score) => Ok(score as f32),
            None => Err(format_error(path, format!("{value} is not a number"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    into_array(path, shape, scores)
}

/// Shape and flattened leaves of the nested array stored at `path`.
pub fn load_nested(path: &Path) -> Result<(Vec<usize>, Vec<Value>), LabelFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| LabelFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let root: Value = serde_json::from_str(&text).map_err(|source| LabelFileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let shape = infer_shape(&root);
    let mut leaves = Vec::with_capacity(shape.iter().product());
    flatten(&root, &shape, &mut leaves).map_err(|reason| format_error(path, reason))?;
    Ok((shape, leaves))
}

fn infer_shape(root: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut node = root;
    while let Value::Array(items) = node {
        shape.push(items.len());
        match items.first() {
            Some(first) => node = first,
            None => break,
        }
    }
    shape
}

fn flatten(node: &Value, shape: &[usize], out: &mut Vec<Value>) -> Result<(), String> {
    match (node, shape.split_first()) {
        (Value::Array(items), Some((&len, rest))) => {
            if items.len() != len {
                return Err(format!("ragged array: expected {len} items, found {}", items.len()));
            }
            items.iter().try_for_each(|item| flatten(item, rest, out))
        }
        (Value::Array(_), None) => Err("array nested deeper than its first element".to_string()),
        (leaf, None) => {
            out.push(leaf.clone());
            Ok(())
        }
        (_, Some(_)) => Err("expected a nested array, found a scalar".to_string()),
    }
}

fn into_array<T>(path: &Path, shape: Vec<usize>, values: Vec<T>) -> Result<ArrayD<T>, LabelFileError> {
    ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|err| format_error(path, err.to_string()))
}

fn format_error(path: &Path, reason: String) -> LabelFileError {
    LabelFileError::Format {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn loads_rank_two_labels() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "t.json", "[[0, 1, 2], [2, -1, 0]]");
        let labels = load_labels(&path).unwrap();
        assert_eq!(labels.shape(), &[2, 3]);
        assert_eq!(labels[[1, 1]], -1);
    }

    #[test]
    fn loads_scores_with_class_axis() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "p.json", "[[[0.1, 0.9]], [[0.7, 0.3]]]");
        let scores = load_scores(&path).unwrap();
        assert_eq!(scores.shape(), &[2, 1, 2]);
        assert!((scores[[1, 0, 0]] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn rejects_ragged_and_non_integer_input() {
        let dir = tempdir().unwrap();
        let ragged = write(dir.path(), "r.json", "[[0, 1], [2]]");
        assert!(matches!(load_labels(&ragged), Err(LabelFileError::Format { .. })));
        let fractional = write(dir.path(), "f.json", "[0, 1.5]");
        assert!(matches!(load_labels(&fractional), Err(LabelFileError::Format { .. })));
        let broken = write(dir.path(), "b.json", "[0, 1");
        assert!(matches!(load_labels(&broken), Err(LabelFileError::Json { .. })));
    }

    #[test]
    fn prediction_kind_follows_rank() {
        let dir = tempdir().unwrap();
        let labels = write(dir.path(), "l.json", "[[0, 1]]");
        assert!(matches!(
            load_prediction(&labels, 2).unwrap(),
            PredictionGrid::Labels(_)
        ));
        let scores = write(dir.path(), "s.json", "[[[0.2, 0.8], [0.6, 0.4]]]");
        assert!(matches!(
            load_prediction(&scores, 2).unwrap(),
            PredictionGrid::Scores(_)
        ));
    }

    #[test]
    fn empty_array_has_zero_length() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "e.json", "[]");
        let labels = load_labels(&path).unwrap();
        assert_eq!(labels.shape(), &[0]);
    }
}
