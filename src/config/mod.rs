//! Training option schema with defaults and JSON snapshots
//!
//! `TrainingOptions` is the single source of truth for everything the
//! external trainer can be told. Defaults follow the recommended LoRA
//! recipe (dim 128 / alpha 64, cosine restarts, fp16, latents cached);
//! a run normally starts from `TrainingOptions::default()` and is then
//! reshaped by one or more JSON documents before argument synthesis.

mod merge;

pub use merge::{load_json, LEGACY_KEY_MAP};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::ensure_path;

/// The full option set handed to the external trainer.
///
/// Every field has a well-defined default. Optional fields set to `None`
/// contribute nothing to the synthesized argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingOptions {
    // Paths and run bookkeeping
    pub base_model: String,
    pub img_folder: String,
    pub output_folder: String,
    pub change_output_name: Option<String>,
    pub save_json_folder: Option<String>,
    pub load_json_path: Option<String>,
    pub json_load_skip_list: Option<Vec<String>>,
    pub multi_run_folder: Option<String>,
    pub save_json_only: bool,

    // Caption handling
    pub caption_dropout_rate: Option<f64>,
    pub caption_dropout_every_n_epochs: Option<usize>,
    pub caption_tag_dropout_rate: Option<f64>,
    pub caption_extension: String,
    pub shuffle_captions: bool,
    pub keep_tokens: Option<usize>,
    pub tag_occurrence_txt_file: bool,

    // Network shape
    pub net_dim: usize,
    pub alpha: f64,

    // Learning rate schedule
    pub scheduler: String,
    pub cosine_restarts: Option<usize>,
    pub scheduler_power: Option<f64>,
    pub warmup_lr_ratio: Option<f64>,
    pub learning_rate: Option<f64>,
    pub text_encoder_lr: Option<f64>,
    pub unet_lr: Option<f64>,

    // Data loading
    pub num_workers: usize,
    pub persistent_workers: bool,

    // Schedule size
    pub batch_size: usize,
    pub num_epochs: usize,
    pub save_every_n_epochs: Option<usize>,
    pub max_steps: Option<usize>,

    // Resolution and bucketing
    pub train_resolution: usize,
    pub min_bucket_resolution: usize,
    pub max_bucket_resolution: usize,
    pub buckets: bool,
    pub bucket_reso_steps: Option<usize>,
    pub bucket_no_upscale: bool,

    // Resume / state
    pub lora_model_for_resume: Option<String>,
    pub save_state: bool,
    pub load_previous_save_state: Option<String>,
    pub training_comment: Option<String>,

    // Which parts to train
    pub unet_only: bool,
    pub text_only: bool,

    // Rarely changed knobs
    pub reg_img_folder: Option<String>,
    pub clip_skip: usize,
    pub test_seed: u64,
    pub prior_loss_weight: f64,
    pub gradient_checkpointing: bool,
    pub gradient_acc_steps: Option<usize>,
    pub mixed_precision: String,
    pub save_precision: String,
    pub save_as: String,
    pub max_clip_token_length: usize,
    pub xformers: bool,
    pub use_8bit_adam: bool,
    pub cache_latents: bool,
    pub color_aug: bool,
    pub flip_aug: bool,
    pub random_crop: bool,
    pub vae: Option<String>,
    pub no_meta: bool,
    pub log_dir: Option<String>,
    pub v2: bool,
    pub v_parameterization: bool,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            base_model: String::new(),
            img_folder: String::new(),
            output_folder: String::new(),
            change_output_name: None,
            save_json_folder: None,
            load_json_path: None,
            json_load_skip_list: None,
            multi_run_folder: None,
            save_json_only: false,

            caption_dropout_rate: None,
            caption_dropout_every_n_epochs: None,
            caption_tag_dropout_rate: None,
            caption_extension: ".txt".to_string(),
            shuffle_captions: false,
            keep_tokens: None,
            tag_occurrence_txt_file: false,

            net_dim: 128,
            alpha: 64.0,

            scheduler: "cosine_with_restarts".to_string(),
            cosine_restarts: Some(1),
            scheduler_power: Some(1.0),
            warmup_lr_ratio: None,
            learning_rate: Some(1e-4),
            text_encoder_lr: None,
            unet_lr: None,

            num_workers: 1,
            persistent_workers: true,

            batch_size: 1,
            num_epochs: 1,
            save_every_n_epochs: Some(1),
            max_steps: None,

            train_resolution: 512,
            min_bucket_resolution: 320,
            max_bucket_resolution: 960,
            buckets: true,
            bucket_reso_steps: None,
            bucket_no_upscale: false,

            lora_model_for_resume: None,
            save_state: false,
            load_previous_save_state: None,
            training_comment: None,

            unet_only: false,
            text_only: false,

            reg_img_folder: None,
            clip_skip: 2,
            test_seed: 23,
            prior_loss_weight: 1.0,
            gradient_checkpointing: false,
            gradient_acc_steps: None,
            mixed_precision: "fp16".to_string(),
            save_precision: "fp16".to_string(),
            save_as: "safetensors".to_string(),
            max_clip_token_length: 150,
            xformers: true,
            use_8bit_adam: true,
            cache_latents: true,
            color_aug: false,
            flip_aug: false,
            random_crop: false,
            vae: None,
            no_meta: false,
            log_dir: None,
            v2: false,
            v_parameterization: false,
        }
    }
}

impl TrainingOptions {
    /// Save a JSON snapshot of this option set into `folder`.
    ///
    /// Batch-mode fields are cleared in the written copy so a reloaded
    /// snapshot configures exactly one run instead of re-triggering
    /// multi-run mode. Returns the path of the written file.
    pub fn save_snapshot(&self, folder: &str) -> Result<PathBuf> {
        if !ensure_path(Some(folder), "save_json_folder", &[]) {
            bail!("Failed to find folder to put json into, make sure you have the correct path");
        }

        let mut snapshot = self.clone();
        snapshot.multi_run_folder = None;
        snapshot.save_json_only = false;

        let path = Path::new(folder).join(format!("config-{}.json", Utc::now().timestamp()));
        let body = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&path, body)
            .with_context(|| format!("Failed to write config snapshot: {}", path.display()))?;
        info!("Saved config snapshot to {}", path.display());
        Ok(path)
    }
}
