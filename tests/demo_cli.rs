//! End-to-end checks for the `segmetrics-demo` binary.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn run_demo(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_segmetrics-demo"))
        .args(args)
        .env("SEGMETRICS_CONFIG_HOME", dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn json_report(dir: &Path, args: &[&str]) -> serde_json::Value {
    let output = run_demo(dir, args);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn sized_grid_reports_every_pixel() {
    let dir = tempdir().unwrap();
    let report = json_report(dir.path(), &["--seed", "1", "--size", "64", "--json"]);
    assert_eq!(report["size"], 64);
    assert_eq!(report["pixels"], 64 * 64);
    let mean = report["dice"]["mean"].as_f64().unwrap();
    assert!(mean > 0.0 && mean < 1.0, "mean = {mean}");
    assert!(report["uniform_loss"].as_f64().unwrap() > 0.0);
}

#[test]
fn same_seed_gives_the_same_report() {
    let dir = tempdir().unwrap();
    let args = ["--seed", "9", "--size", "32", "--batches", "2", "--json"];
    assert_eq!(json_report(dir.path(), &args), json_report(dir.path(), &args));
}

#[test]
fn loss_section_of_config_drives_uniform_loss() {
    let dir = tempdir().unwrap();
    let default_report = json_report(dir.path(), &["--size", "32", "--json"]);

    let config = dir.path().join("smooth.toml");
    std::fs::write(&config, "[loss]\nsmooth = 1000.0\n").unwrap();
    let smoothed = json_report(
        dir.path(),
        &["--size", "32", "--config", config.to_str().unwrap(), "--json"],
    );

    let default_loss = default_report["uniform_loss"].as_f64().unwrap();
    let smoothed_loss = smoothed["uniform_loss"].as_f64().unwrap();
    // More smoothing pulls every class Dice towards one.
    assert!(smoothed_loss < default_loss, "{smoothed_loss} vs {default_loss}");
    assert_eq!(smoothed["dice"], default_report["dice"]);
}

#[test]
fn grid_below_minimum_size_fails() {
    let dir = tempdir().unwrap();
    let output = run_demo(dir.path(), &["--size", "4"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("grid size 4"));
}
