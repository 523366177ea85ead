//! Score uniformly random labels against a synthetic block ground truth.

use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use segmetrics::config;
use segmetrics::logging::{self, LogFile};
use segmetrics::ml::loss::SoftDiceLoss;
use segmetrics::ml::metrics::{DiceCoefficient, DiceOptions, DiceScore};
use segmetrics::ml::synthetic::{
    GRID_CLASSES, GRID_SIZE, block_ground_truth_sized, random_labels,
};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone)]
struct CliOptions {
    seed: u64,
    size: usize,
    batches: usize,
    config_path: Option<PathBuf>,
    json: bool,
}

#[derive(Debug, Serialize)]
struct DemoReport<'a> {
    seed: u64,
    size: usize,
    batches: usize,
    pixels: u64,
    dice: &'a DiceScore,
    uniform_loss: f64,
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    if let Err(err) = logging::init("warn", LogFile::Disabled) {
        eprintln!("Logging disabled: {err}");
    }

    let config = match &options.config_path {
        Some(path) => config::load_from(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;

    let target = block_ground_truth_sized(options.size).map_err(|err| err.to_string())?;
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut metric = DiceCoefficient::new(DiceOptions {
        num_classes: GRID_CLASSES,
        reduced_probs: true,
        ..DiceOptions::default()
    })
    .map_err(|err| err.to_string())?;

    for batch in 0..options.batches {
        let pred = random_labels(&mut rng, target.dim(), GRID_CLASSES);
        metric
            .add(pred.view(), target.view())
            .map_err(|err| err.to_string())?;
        tracing::debug!(batch, total = metric.confusion().total(), "Scored random batch");
    }
    let score = metric.value();

    // A perfect one-hot prediction has zero soft-Dice loss; the uniform
    // distribution shows the loss a random model starts from.
    let uniform = ndarray::Array3::<f32>::from_elem(
        (GRID_CLASSES, target.nrows(), target.ncols()),
        1.0 / GRID_CLASSES as f32,
    );
    // The demo grid has no batch axis, so classes lead.
    let loss_fn = SoftDiceLoss {
        class_axis: 0,
        ..config.loss
    };
    let loss = loss_fn
        .compute(uniform.view(), target.view())
        .map_err(|err| err.to_string())?;

    if options.json {
        let report = DemoReport {
            seed: options.seed,
            size: options.size,
            batches: options.batches,
            pixels: metric.confusion().total(),
            dice: &score,
            uniform_loss: loss,
        };
        let text = serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?;
        println!("{text}");
        return Ok(());
    }
    println!(
        "seed={}  size={}  batches={}  pixels={}",
        options.seed,
        options.size,
        options.batches,
        metric.confusion().total()
    );
    for (idx, dice) in score.per_class.iter().enumerate() {
        println!("class {idx}  dice={dice:.4}");
    }
    println!("mean dice: {:.4}", score.mean);
    println!(
        "soft-dice loss of a uniform prediction (smooth={}): {loss:.4}",
        loss_fn.smooth
    );
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        seed: 0,
        size: GRID_SIZE,
        batches: 1,
        config_path: None,
        json: false,
    };
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => return Err(help_text()),
            "--seed" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--seed requires a value".to_string())?;
                options.seed = value
                    .parse::<u64>()
                    .map_err(|_| format!("Invalid --seed value: {value}"))?;
            }
            "--size" => {
                idx += 1;
                let value = args.get(idx).ok_or_else(|| "--size requires a value".to_string())?;
                options.size = value
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid --size value: {value}"))?;
            }
            "--config" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--config requires a value".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            "--batches" => {
                idx += 1;
                let value =
                    args.get(idx).ok_or_else(|| "--batches requires a value".to_string())?;
                options.batches = value
                    .parse::<usize>()
                    .ok()
                    .filter(|&batches| batches > 0)
                    .ok_or_else(|| format!("Invalid --batches value: {value}"))?;
            }
            "--json" => options.json = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    Ok(options)
}

fn help_text() -> String {
    [
        "segmetrics-demo",
        "",
        "Usage:",
        "  segmetrics-demo [options]",
        "",
        "Options:",
        "  --seed <n>              Random seed (default: 0).",
        "  --size <n>              Grid side length (default: 224, minimum: 8).",
        "  --batches <n>           Random predictions to accumulate (default: 1).",
        "  --config <config.toml>  Settings file; `[loss]` drives the soft-Dice loss.",
        "  --json                  Print a JSON report.",
    ]
    .join("\n")
}
