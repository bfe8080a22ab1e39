//! JSON merge engine
//!
//! Loads a flat JSON document onto an existing `TrainingOptions`. Keys may
//! be internal field names or the trainer's own flag names, which are
//! remapped through `LEGACY_KEY_MAP` first. Unknown keys are ignored,
//! skip-listed keys are left untouched, and every applied change is logged
//! old -> new. A value that cannot be coerced to its field's declared type
//! aborts the merge with nothing applied.

use anyhow::{bail, Context, Result};
use log::info;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;

use super::TrainingOptions;
use crate::error::LaunchError;
use crate::paths::ensure_path;

/// Trainer flag names accepted in incoming JSON, mapped to internal fields.
pub static LEGACY_KEY_MAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("pretrained_model_name_or_path", "base_model"),
        ("logging_dir", "log_dir"),
        ("train_data_dir", "img_folder"),
        ("reg_data_dir", "reg_img_folder"),
        ("output_dir", "output_folder"),
        ("max_resolution", "train_resolution"),
        ("lr_scheduler", "scheduler"),
        ("lr_warmup", "warmup_lr_ratio"),
        ("train_batch_size", "batch_size"),
        ("epoch", "num_epochs"),
        ("save_at_n_epochs", "save_every_n_epochs"),
        ("num_cpu_threads_per_process", "num_workers"),
        ("enable_bucket", "buckets"),
        ("save_model_as", "save_as"),
        ("shuffle_caption", "shuffle_captions"),
        ("resume", "load_previous_save_state"),
        ("network_dim", "net_dim"),
        ("gradient_accumulation_steps", "gradient_acc_steps"),
        ("output_name", "change_output_name"),
        ("network_alpha", "alpha"),
        ("lr_scheduler_num_cycles", "cosine_restarts"),
        ("lr_scheduler_power", "scheduler_power"),
    ])
});

// Fields coerced to an integer count, truncating fractional input.
const INT_FIELDS: &[&str] = &["keep_tokens", "warmup_lr_ratio"];
// Fields coerced to a float learning rate.
const FLOAT_FIELDS: &[&str] = &["learning_rate", "unet_lr", "text_encoder_lr"];
// Legacy fields that external producers sometimes serialize as strings.
const LEGACY_INT_FIELDS: &[&str] = &["batch_size", "num_epochs"];

/// Load `path` and merge its contents onto `options`.
///
/// Honors `options.json_load_skip_list`; either everything coercible is
/// applied or nothing is.
pub fn load_json(path: &str, options: &mut TrainingOptions) -> Result<()> {
    if !ensure_path(Some(path), "load_json_path", &["json"]) {
        return Err(LaunchError::BadPath {
            name: "load_json_path".to_string(),
        }
        .into());
    }

    let body = fs::read_to_string(path)
        .with_context(|| format!("Failed to read json config: {}", path))?;
    let parsed: Value =
        serde_json::from_str(&body).with_context(|| format!("Failed to parse json: {}", path))?;
    let Value::Object(mut incoming) = parsed else {
        bail!("Expected a json object at the top level of {}", path);
    };

    info!("loaded json, setting variables...");

    // Fold legacy keys onto their internal names before applying.
    for (legacy, internal) in LEGACY_KEY_MAP.iter() {
        let Some(value) = incoming.get(*legacy).cloned() else {
            continue;
        };
        let value = if LEGACY_INT_FIELDS.contains(internal) {
            coerce_int(legacy, &value)?
        } else {
            value
        };
        incoming.insert((*internal).to_string(), value);
    }

    let mut schema = match serde_json::to_value(&*options)? {
        Value::Object(map) => map,
        _ => unreachable!("TrainingOptions serializes to an object"),
    };
    let skip_list = options.json_load_skip_list.clone().unwrap_or_default();

    // Coerce everything up front so a bad value aborts with no field applied.
    let mut changes: Vec<(String, Value)> = Vec::new();
    for (key, value) in &incoming {
        if skip_list.iter().any(|s| s == key) || !schema.contains_key(key) {
            continue;
        }
        let value = if value.is_null() {
            value.clone()
        } else if INT_FIELDS.contains(&key.as_str()) {
            coerce_int(key, value)?
        } else if FLOAT_FIELDS.contains(&key.as_str()) {
            coerce_float(key, value)?
        } else {
            value.clone()
        };
        changes.push((key.clone(), value));
    }

    for (key, value) in changes {
        let old = &schema[&key];
        if *old != value {
            info!("{} changed from {} to {}", key, old, value);
        }
        schema.insert(key, value);
    }

    *options = serde_json::from_value(Value::Object(schema))
        .with_context(|| format!("Failed to apply json config: {}", path))?;
    info!("completed changing variables.");
    Ok(())
}

fn coerce_int(field: &str, value: &Value) -> Result<Value> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) => Ok(Value::from(n)),
        None => Err(LaunchError::Coerce {
            field: field.to_string(),
            expected: "an integer",
        }
        .into()),
    }
}

fn coerce_float(field: &str, value: &Value) -> Result<Value> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) => Ok(Value::from(f)),
        None => Err(LaunchError::Coerce {
            field: field.to_string(),
            expected: "a number",
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_json(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_internal_keys_applied() {
        let dir = tempdir().unwrap();
        let path = write_json(
            dir.path(),
            "job.json",
            r#"{"net_dim": 32, "alpha": 16.0, "shuffle_captions": true}"#,
        );
        let mut opts = TrainingOptions::default();
        load_json(&path, &mut opts).unwrap();
        assert_eq!(opts.net_dim, 32);
        assert_eq!(opts.alpha, 16.0);
        assert!(opts.shuffle_captions);
    }

    #[test]
    fn test_legacy_keys_remapped() {
        let dir = tempdir().unwrap();
        let path = write_json(
            dir.path(),
            "job.json",
            r#"{
                "pretrained_model_name_or_path": "/models/base.safetensors",
                "train_batch_size": "4",
                "epoch": 10,
                "lr_scheduler": "polynomial",
                "output_name": "my_lora"
            }"#,
        );
        let mut opts = TrainingOptions::default();
        load_json(&path, &mut opts).unwrap();
        assert_eq!(opts.base_model, "/models/base.safetensors");
        assert_eq!(opts.batch_size, 4);
        assert_eq!(opts.num_epochs, 10);
        assert_eq!(opts.scheduler, "polynomial");
        assert_eq!(opts.change_output_name.as_deref(), Some("my_lora"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let dir = tempdir().unwrap();
        let path = write_json(dir.path(), "job.json", r#"{"not_a_real_option": 7}"#);
        let mut opts = TrainingOptions::default();
        load_json(&path, &mut opts).unwrap();
        assert_eq!(opts, TrainingOptions::default());
    }

    #[test]
    fn test_skip_list_is_honored() {
        let dir = tempdir().unwrap();
        let path = write_json(
            dir.path(),
            "job.json",
            r#"{"base_model": "/elsewhere/model.ckpt", "net_dim": 8}"#,
        );
        let mut opts = TrainingOptions::default();
        opts.base_model = "/models/base.safetensors".to_string();
        opts.json_load_skip_list = Some(vec!["base_model".to_string()]);
        load_json(&path, &mut opts).unwrap();
        assert_eq!(opts.base_model, "/models/base.safetensors");
        assert_eq!(opts.net_dim, 8);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = write_json(
            dir.path(),
            "job.json",
            r#"{"net_dim": 64, "learning_rate": "5e-5", "keep_tokens": 2}"#,
        );
        let mut first = TrainingOptions::default();
        load_json(&path, &mut first).unwrap();
        let mut second = first.clone();
        load_json(&path, &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_numeric_strings_coerced() {
        let dir = tempdir().unwrap();
        let path = write_json(
            dir.path(),
            "job.json",
            r#"{"learning_rate": "1e-5", "keep_tokens": "3", "unet_lr": 0.0001}"#,
        );
        let mut opts = TrainingOptions::default();
        load_json(&path, &mut opts).unwrap();
        assert_eq!(opts.learning_rate, Some(1e-5));
        assert_eq!(opts.keep_tokens, Some(3));
        assert_eq!(opts.unet_lr, Some(0.0001));
    }

    #[test]
    fn test_bad_integer_is_fatal_and_applies_nothing() {
        let dir = tempdir().unwrap();
        let path = write_json(
            dir.path(),
            "job.json",
            r#"{"net_dim": 8, "keep_tokens": "lots"}"#,
        );
        let mut opts = TrainingOptions::default();
        let err = load_json(&path, &mut opts).unwrap_err();
        assert!(err.downcast_ref::<LaunchError>().is_some());
        // nothing applied, including the valid net_dim
        assert_eq!(opts, TrainingOptions::default());
    }

    #[test]
    fn test_bad_legacy_batch_size_is_fatal() {
        let dir = tempdir().unwrap();
        let path = write_json(dir.path(), "job.json", r#"{"train_batch_size": "four"}"#);
        let mut opts = TrainingOptions::default();
        assert!(load_json(&path, &mut opts).is_err());
    }

    #[test]
    fn test_null_clears_optional_field() {
        let dir = tempdir().unwrap();
        let path = write_json(dir.path(), "job.json", r#"{"save_every_n_epochs": null}"#);
        let mut opts = TrainingOptions::default();
        assert_eq!(opts.save_every_n_epochs, Some(1));
        load_json(&path, &mut opts).unwrap();
        assert_eq!(opts.save_every_n_epochs, None);
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let mut opts = TrainingOptions::default();
        assert!(load_json("/nonexistent/job.json", &mut opts).is_err());
    }

    #[test]
    fn test_non_json_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_json(dir.path(), "job.yaml", r#"{"net_dim": 8}"#);
        let mut opts = TrainingOptions::default();
        assert!(load_json(&path, &mut opts).is_err());
    }
}
