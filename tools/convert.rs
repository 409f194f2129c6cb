//! Conversion Job Tool
//!
//! Runs one conversion job: reads the feature store units listed in an
//! input file and writes train/test/validate `.npy` datasets to the output
//! directory.
//!
//! # Usage
//!
//! ```bash
//! # Paths from the environment
//! DEEP_DATA_DIR=data/deep SUBMIT_NPY=/store/npy \
//!     cargo run --release --bin convert -- inputs.txt ZpTT_med-2000_3
//!
//! # From a TOML (or JSON) config, overriding the seed
//! cargo run --release --bin convert -- --config convert.toml --seed 7 inputs.txt QCD_12
//!
//! # Generate sample config
//! cargo run --release --bin convert -- --generate-config convert.toml
//! ```
//!
//! The process exits with 0 on success or when there is nothing to write,
//! and with the worst relocation status otherwise. Setup and data errors
//! exit with 1.

use clap::Parser;
use jet_dataset::config::{ConvertConfig, PathConfig};
use jet_dataset::{ConversionOutcome, ConversionPipeline};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "convert", about = "Convert feature store units into split NumPy datasets")]
struct Args {
    /// File listing one feature store unit per line.
    #[arg(required_unless_present = "generate_config")]
    input_list: Option<PathBuf>,

    /// Job name; selects the process category and reference histograms.
    #[arg(required_unless_present = "generate_config")]
    job_name: Option<String>,

    /// TOML or JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory with normalization profiles and reference histograms.
    #[arg(long, env = "DEEP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Stage-out destination root.
    #[arg(long, env = "SUBMIT_NPY")]
    output_dir: Option<PathBuf>,

    /// Local scratch directory.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Seed for the split shuffle.
    #[arg(long)]
    seed: Option<u64>,

    /// Skip pf/sv normalization.
    #[arg(long)]
    no_normalize: bool,

    /// Store a raw .npz snapshot of the merged dataset.
    #[arg(long)]
    store_raw: bool,

    /// Write a sample configuration to this path and exit.
    #[arg(long, value_name = "PATH")]
    generate_config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if let Some(path) = &args.generate_config {
        generate_sample_config(path);
        return;
    }

    let config = match resolve_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    let (Some(input_list), Some(job_name)) = (&args.input_list, &args.job_name) else {
        eprintln!("❌ input list and job name are required");
        std::process::exit(1);
    };

    let outcome = ConversionPipeline::new(config, job_name).and_then(|p| p.run(input_list));
    match outcome {
        Ok(outcome) => {
            print_summary(&outcome);
            std::process::exit(outcome.exit_code());
        }
        Err(e) => {
            eprintln!("❌ Conversion failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Config file (if any), then command-line overrides.
fn resolve_config(args: &Args) -> Result<ConvertConfig, String> {
    let mut config = match &args.config {
        Some(path) => {
            let loaded = if has_extension(path, "json") {
                ConvertConfig::load_json(path)
            } else {
                ConvertConfig::load_toml(path)
            };
            let config = loaded.map_err(|e| format!("Failed to load config: {e}"))?;
            println!("✅ Loaded configuration: {}", path.display());
            config
        }
        None => {
            let data_dir = args
                .data_dir
                .clone()
                .ok_or("no data directory: pass --data-dir or set DEEP_DATA_DIR")?;
            let output_dir = args
                .output_dir
                .clone()
                .ok_or("no output directory: pass --output-dir or set SUBMIT_NPY")?;
            ConvertConfig::new(PathConfig::new(data_dir, output_dir))
        }
    };

    if let Some(dir) = &args.data_dir {
        config.paths.data_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(dir) = &args.scratch_dir {
        config.paths.scratch_dir = dir.clone();
    }
    if let Some(seed) = args.seed {
        config.split.seed = Some(seed);
    }
    if args.no_normalize {
        config.options.normalize = false;
    }
    if args.store_raw {
        config.options.store_raw = true;
    }

    config
        .validate()
        .map_err(|e| format!("Configuration validation failed: {e}"))?;
    Ok(config)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn print_summary(outcome: &ConversionOutcome) {
    match outcome {
        ConversionOutcome::Empty(reason) => {
            println!("⚠️  Nothing to write: {reason}");
        }
        ConversionOutcome::Completed(summary) => {
            println!();
            println!("Job {} (nPartons == {})", summary.job_name, summary.n_partons);
            println!(
                "  Events:   {} read, {} kept, {} accepted",
                summary.assembly.events_read, summary.assembly.events_kept, summary.events_accepted
            );
            println!(
                "  Splits:   train {} / test {} / validate {}",
                summary.train, summary.test, summary.validate
            );
            let report = &summary.stage_out;
            let failed = report.failures().count();
            if failed == 0 {
                println!("✅ Staged out {} files", report.records.len());
            } else {
                println!(
                    "❌ {failed}/{} files failed to stage out (status {})",
                    report.records.len(),
                    report.worst_status
                );
            }
        }
    }
}

/// Write a sample configuration file.
fn generate_sample_config(path: &Path) {
    let sample = ConvertConfig::new(PathConfig::new(
        "/path/to/data/deep", // User should modify
        "/path/to/store/npy",
    ));

    let saved = if has_extension(path, "json") {
        sample.save_json(path)
    } else {
        sample.save_toml(path)
    };
    match saved {
        Ok(()) => {
            println!("✅ Generated sample config: {}", path.display());
            println!("\nEdit the following fields before running:");
            println!("  - paths.data_dir: normalization profiles and flatten histograms");
            println!("  - paths.output_dir: stage-out destination");
        }
        Err(e) => {
            eprintln!("Error generating config: {e}");
            std::process::exit(1);
        }
    }
}
