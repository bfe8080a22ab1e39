//! LoRA training launcher
//!
//! Usage: cargo run --bin launch -- --trainer /path/to/train_network [--load-json job.json]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use lora_launcher::{RunPlan, SubprocessTrainer, TrainingOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Configure and launch an external LoRA trainer")]
struct Args {
    /// External trainer entry point to invoke
    #[arg(long, default_value = "train_network")]
    trainer: PathBuf,

    /// Path to a json file to configure things from
    #[arg(long)]
    load_json: Option<PathBuf>,

    /// Path to save a configuration json file to
    #[arg(long)]
    save_json_folder: Option<PathBuf>,

    /// Path to load a set of json files to train all at once
    #[arg(long)]
    multi_run_folder: Option<PathBuf>,

    /// Write the configuration snapshot and exit without training
    #[arg(long)]
    save_json_only: bool,
}

fn main() -> Result<()> {
    lora_launcher::logging::init_logger();

    let args = Args::parse();
    let mut options = TrainingOptions::default();
    if let Some(path) = &args.load_json {
        options.load_json_path = Some(path.to_string_lossy().into_owned());
    }
    if let Some(folder) = &args.save_json_folder {
        options.save_json_folder = Some(folder.to_string_lossy().into_owned());
    }
    if let Some(folder) = &args.multi_run_folder {
        options.multi_run_folder = Some(folder.to_string_lossy().into_owned());
    }
    if args.save_json_only {
        options.save_json_only = true;
    }

    let mut trainer = SubprocessTrainer::new(&args.trainer);
    RunPlan::new(options).execute(&mut trainer)?;

    log::info!("All runs completed successfully");
    Ok(())
}
