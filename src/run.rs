//! Run orchestration
//!
//! Drives either a single training run or a batch of JSON job files
//! (multi-run mode). The external trainer sits behind the `Trainer` trait
//! so the driver can be exercised without launching a real process.
//!
//! Multi-run completion is marked by moving the consumed job file into a
//! `complete/` subfolder. A crash mid-job leaves the file in place, so the
//! job is re-attempted on the next invocation: at-least-once, not
//! exactly-once. Concurrent invocations against the same folder race on
//! the file move and are unsupported.

use anyhow::{bail, Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::command::build_args;
use crate::config::{load_json, TrainingOptions};
use crate::error::LaunchError;
use crate::paths::ensure_path;
use crate::tags::write_tag_occurrence_file;

/// The external trainer entry point, seen only through its argument list.
pub trait Trainer {
    fn train(&mut self, args: &[String]) -> Result<()>;
}

/// Production trainer: spawns the configured program and waits for it.
/// Each job runs in its own process, so any accelerator memory it held is
/// released when it exits.
pub struct SubprocessTrainer {
    program: PathBuf,
}

impl SubprocessTrainer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Trainer for SubprocessTrainer {
    fn train(&mut self, args: &[String]) -> Result<()> {
        info!("Launching trainer: {}", self.program.display());
        let status = Command::new(&self.program)
            .args(args)
            .status()
            .with_context(|| format!("Failed to launch trainer: {}", self.program.display()))?;
        if !status.success() {
            bail!("Trainer exited with {}", status);
        }
        Ok(())
    }
}

/// A resolved plan for one invocation of the launcher.
pub struct RunPlan {
    options: TrainingOptions,
}

impl RunPlan {
    pub fn new(options: TrainingOptions) -> Self {
        Self { options }
    }

    /// Execute the plan: multi-run mode when a job folder is configured,
    /// otherwise a single run.
    pub fn execute(mut self, trainer: &mut dyn Trainer) -> Result<()> {
        if let Some(folder) = self.options.multi_run_folder.clone() {
            return run_batch(&folder, trainer);
        }

        if let Some(json_path) = self.options.load_json_path.clone() {
            if !self.options.save_json_only {
                load_json(&json_path, &mut self.options)?;
            }
        }
        if let Some(folder) = self.options.save_json_folder.clone() {
            self.options.save_snapshot(&folder)?;
        }

        let args = build_args(&self.options)?;
        if self.options.tag_occurrence_txt_file {
            write_tag_occurrence_file(&self.options)?;
        }
        if self.options.save_json_only {
            info!("save_json_only set, skipping training");
            return Ok(());
        }
        trainer.train(&args)
    }
}

/// Train every `*.json` job directly inside `folder`, in directory listing
/// order, moving each consumed file into `complete/` afterwards.
fn run_batch(folder: &str, trainer: &mut dyn Trainer) -> Result<()> {
    if !ensure_path(Some(folder), "multi_run_folder", &[]) {
        return Err(LaunchError::BadPath {
            name: "multi_run_folder".to_string(),
        }
        .into());
    }

    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to read multi-run folder: {}", folder))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        info!("Starting multi-run job: {}", path.display());

        // Fresh defaults per job; the skip-list never applies in batch mode.
        let mut options = TrainingOptions::default();
        options.json_load_skip_list = None;
        load_json(&path.to_string_lossy(), &mut options)?;

        let args = build_args(&options)?;
        if options.tag_occurrence_txt_file {
            write_tag_occurrence_file(&options)?;
        }
        trainer.train(&args)?;

        let complete = Path::new(folder).join("complete");
        if !complete.exists() {
            fs::create_dir_all(&complete)
                .with_context(|| format!("Failed to create {}", complete.display()))?;
        }
        let file_name = path.file_name().context("job file has no name")?;
        fs::rename(&path, complete.join(file_name))
            .with_context(|| format!("Failed to mark job complete: {}", path.display()))?;
        info!("Completed multi-run job: {}", path.display());
    }
    Ok(())
}
