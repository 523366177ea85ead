//! Evaluate predicted segmentation labels against ground truth.

use std::path::PathBuf;

use serde::Serialize;

use segmetrics::config::{self, MetricsConfig};
use segmetrics::label_file::{PredictionGrid, load_labels, load_prediction};
use segmetrics::logging::{self, LogFile};
use segmetrics::ml::metrics::{DiceCoefficient, DiceScore, IgnoreIndices};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    pred_path: PathBuf,
    target_path: PathBuf,
    config_path: Option<PathBuf>,
    num_classes: Option<usize>,
    ignore: Option<IgnoreIndices>,
    normalized: bool,
    json: bool,
    top: Option<usize>,
    log_file: LogFile,
}

#[derive(Debug, Serialize)]
struct EvalReport<'a> {
    dice: &'a DiceScore,
    confusion: Vec<Vec<u64>>,
    scored_pixels: u64,
    dropped_pixels: u64,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("info", options.log_file.clone()) {
        eprintln!("Logging disabled: {err}");
    }

    let mut config = match &options.config_path {
        Some(path) => config::load_from(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;
    apply_overrides(&mut config, &options);

    let target = load_labels(&options.target_path).map_err(|err| err.to_string())?;
    let pred = load_prediction(&options.pred_path, target.ndim()).map_err(|err| err.to_string())?;
    config.dice.reduced_probs = matches!(pred, PredictionGrid::Labels(_));
    tracing::debug!(
        reduced_probs = config.dice.reduced_probs,
        "Target shape {:?}",
        target.shape()
    );
    config.validate().map_err(|err| err.to_string())?;

    let mut metric = DiceCoefficient::new(config.dice.clone()).map_err(|err| err.to_string())?;
    let added = match &pred {
        PredictionGrid::Labels(labels) => metric.add(labels.view(), target.view()),
        PredictionGrid::Scores(scores) => metric.add(scores.view(), target.view()),
    };
    added.map_err(|err| err.to_string())?;

    let score = metric.value();
    let cm = metric.confusion();
    let scored_pixels = cm.total();
    let dropped_pixels = target.len() as u64 - scored_pixels;
    tracing::info!(scored_pixels, dropped_pixels, "Evaluated {}", options.pred_path.display());

    if config.report.json {
        let report = EvalReport {
            dice: &score,
            confusion: cm.counts().rows().into_iter().map(|row| row.to_vec()).collect(),
            scored_pixels,
            dropped_pixels,
        };
        let text = serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?;
        println!("{text}");
        return Ok(());
    }

    println!("mean dice: {:.4}", score.mean);
    for (idx, dice) in score.per_class.iter().enumerate() {
        let support: u64 = cm.counts().row(idx).sum();
        let note = if config.dice.ignore_indices.contains(idx) {
            "  (ignored)"
        } else {
            ""
        };
        println!("class {idx:>2}  dice={dice:.4}  support={support}{note}");
    }
    println!("scored pixels: {scored_pixels}  dropped: {dropped_pixels}");
    println!("confusion matrix (rows=true, cols=pred):");
    for truth in 0..cm.num_classes() {
        let mut row = String::new();
        for pred in 0..cm.num_classes() {
            row.push_str(&format!("{:8}", cm.get(truth, pred)));
        }
        println!("{row}");
    }

    let mut confusions = Vec::new();
    for truth in 0..cm.num_classes() {
        for pred in 0..cm.num_classes() {
            let count = cm.get(truth, pred);
            if truth != pred && count > 0 {
                confusions.push((count, truth, pred));
            }
        }
    }
    if !confusions.is_empty() {
        println!();
        println!("Top confusions:");
        confusions.sort_by(|a, b| b.0.cmp(&a.0));
        for (count, truth, pred) in confusions.into_iter().take(config.report.top_confusions) {
            println!("- {truth} -> {pred}: {count}");
        }
    }
    Ok(())
}

fn apply_overrides(config: &mut MetricsConfig, options: &CliOptions) {
    if let Some(num_classes) = options.num_classes {
        config.dice.num_classes = num_classes;
    }
    if let Some(ignore) = &options.ignore {
        config.dice.ignore_indices = ignore.clone();
    }
    if options.normalized {
        config.dice.normalized = true;
    }
    if options.json {
        config.report.json = true;
    }
    if let Some(top) = options.top {
        config.report.top_confusions = top;
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut pred_path: Option<PathBuf> = None;
    let mut target_path: Option<PathBuf> = None;

    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--pred" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--pred requires a value".to_string())?;
                pred_path = Some(PathBuf::from(value));
            }
            "--target" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--target requires a value".to_string())?;
                target_path = Some(PathBuf::from(value));
            }
            "--config" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--num-classes" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--num-classes requires a value".to_string())?;
                options.num_classes = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --num-classes value: {value}"))?,
                );
            }
            "--ignore" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--ignore requires a value".to_string())?;
                options.ignore = Some(parse_ignore(value)?);
            }
            "--top" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--top requires a value".to_string())?;
                options.top = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid --top value: {value}"))?,
                );
            }
            "--log-dir" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--log-dir requires a value".to_string())?;
                options.log_file = LogFile::Dir(PathBuf::from(value));
            }
            "--log" => options.log_file = LogFile::AppDir,
            "--normalized" => options.normalized = true,
            "--json" => options.json = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }

    options.pred_path = pred_path.ok_or_else(|| "--pred is required".to_string())?;
    options.target_path = target_path.ok_or_else(|| "--target is required".to_string())?;
    Ok(options)
}

fn parse_ignore(value: &str) -> Result<IgnoreIndices, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| format!("Invalid --ignore index: {part}"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(IgnoreIndices::from)
}

fn help_text() -> String {
    [
        "segmetrics",
        "",
        "Usage:",
        "  segmetrics --pred <pred.json> --target <target.json> [options]",
        "",
        "The prediction holds labels (same rank as the target) or per-class",
        "scores (one extra class axis, see dice.class_axis).",
        "",
        "Options:",
        "  --config <config.toml>  Settings file (default: app config dir).",
        "  --num-classes <n>       Number of classes.",
        "  --ignore <i,j,...>      Class indices excluded from scoring.",
        "  --normalized            Score the row-normalized confusion matrix.",
        "  --top <n>               Top N confusions to list.",
        "  --json                  Print a JSON report.",
        "  --log                   Also log to the app log directory.",
        "  --log-dir <dir>         Also log to a file in <dir>.",
    ]
    .join("\n")
}
