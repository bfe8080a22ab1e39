//! Argument synthesis for the external trainer
//!
//! Turns a resolved `TrainingOptions` into the flat `--flag=value` list the
//! trainer entry point understands. Required paths are validated up front,
//! optional flags are appended only when their option is set, and
//! scheduler-specific flags only when the matching scheduler is selected.

use anyhow::Result;

use crate::config::TrainingOptions;
use crate::dataset::find_max_steps;
use crate::error::LaunchError;
use crate::paths::ensure_path;

/// Build the complete argument list for one training run.
///
/// When `max_steps` is unset the step count used for warm-up derivation is
/// computed from the dataset folder layout.
pub fn build_args(options: &TrainingOptions) -> Result<Vec<String>> {
    require_path(Some(options.base_model.as_str()), "base_model", &["ckpt", "safetensors"])?;
    require_path(Some(options.img_folder.as_str()), "img_folder", &[])?;
    require_path(Some(options.output_folder.as_str()), "output_folder", &[])?;

    let mut args = vec![
        "--network_module=networks.lora".to_string(),
        format!("--pretrained_model_name_or_path={}", options.base_model),
        format!("--train_data_dir={}", options.img_folder),
        format!("--output_dir={}", options.output_folder),
        format!("--prior_loss_weight={}", options.prior_loss_weight),
        format!("--caption_extension={}", options.caption_extension),
        format!("--resolution={}", options.train_resolution),
        format!("--train_batch_size={}", options.batch_size),
        format!("--mixed_precision={}", options.mixed_precision),
        format!("--save_precision={}", options.save_precision),
        format!("--network_dim={}", options.net_dim),
        format!("--save_model_as={}", options.save_as),
        format!("--clip_skip={}", options.clip_skip),
        format!("--seed={}", options.test_seed),
        format!("--max_token_length={}", options.max_clip_token_length),
        format!("--lr_scheduler={}", options.scheduler),
        format!("--network_alpha={}", options.alpha),
        format!("--max_data_loader_n_workers={}", options.num_workers),
    ];

    let steps = match options.max_steps {
        Some(max_steps) => {
            args.push(format!("--max_train_steps={}", max_steps));
            max_steps
        }
        None => {
            args.push(format!("--max_train_epochs={}", options.num_epochs));
            find_max_steps(&options.img_folder, options.batch_size, options.num_epochs)?
        }
    };
    args.extend(optional_args(options, steps)?);

    Ok(args)
}

fn optional_args(options: &TrainingOptions, steps: usize) -> Result<Vec<String>> {
    let mut args = Vec::new();

    if let Some(reg) = &options.reg_img_folder {
        require_path(Some(reg.as_str()), "reg_img_folder", &[])?;
        args.push(format!("--reg_data_dir={}", reg));
    }

    if let Some(weights) = &options.lora_model_for_resume {
        require_path(
            Some(weights.as_str()),
            "lora_model_for_resume",
            &["pt", "ckpt", "safetensors"],
        )?;
        args.push(format!("--network_weights={}", weights));
    }

    match options.save_every_n_epochs {
        Some(n) => args.push(format!("--save_every_n_epochs={}", n)),
        None => args.push("--save_every_n_epochs=999999".to_string()),
    }

    if options.shuffle_captions {
        args.push("--shuffle_caption".to_string());
    }

    if let Some(n) = options.keep_tokens {
        if n > 0 {
            args.push(format!("--keep_tokens={}", n));
        }
    }

    if options.buckets {
        args.push("--enable_bucket".to_string());
        args.push(format!("--min_bucket_reso={}", options.min_bucket_resolution));
        args.push(format!("--max_bucket_reso={}", options.max_bucket_resolution));
    }

    if options.use_8bit_adam {
        args.push("--use_8bit_adam".to_string());
    }

    if options.xformers {
        args.push("--xformers".to_string());
    }

    if options.color_aug {
        if options.cache_latents {
            return Err(LaunchError::Conflict(
                "color_aug and cache_latents conflict with one another. Please select only one"
                    .to_string(),
            )
            .into());
        }
        args.push("--color_aug".to_string());
    }

    if options.flip_aug {
        args.push("--flip_aug".to_string());
    }

    if options.cache_latents {
        args.push("--cache_latents".to_string());
    }

    if let Some(ratio) = options.warmup_lr_ratio {
        if ratio > 0.0 {
            let warmup_steps = (steps as f64 * ratio) as usize;
            args.push(format!("--lr_warmup_steps={}", warmup_steps));
        }
    }

    if options.gradient_checkpointing {
        args.push("--gradient_checkpointing".to_string());
    }

    if let Some(acc) = options.gradient_acc_steps {
        if acc > 0 && options.gradient_checkpointing {
            args.push(format!("--gradient_accumulation_steps={}", acc));
        }
    }

    if let Some(lr) = options.learning_rate {
        if lr > 0.0 {
            args.push(format!("--learning_rate={}", lr));
        }
    }

    if let Some(lr) = options.text_encoder_lr {
        if lr > 0.0 {
            args.push(format!("--text_encoder_lr={}", lr));
        }
    }

    if let Some(lr) = options.unet_lr {
        if lr > 0.0 {
            args.push(format!("--unet_lr={}", lr));
        }
    }

    if let Some(vae) = &options.vae {
        args.push(format!("--vae={}", vae));
    }

    if options.no_meta {
        args.push("--no_metadata".to_string());
    }

    if options.save_state {
        args.push("--save_state".to_string());
    }

    if let Some(state) = &options.load_previous_save_state {
        require_path(Some(state.as_str()), "previous_state", &[])?;
        args.push(format!("--resume={}", state));
    }

    if let Some(name) = &options.change_output_name {
        args.push(format!("--output_name={}", name));
    }

    if let Some(comment) = &options.training_comment {
        args.push(format!("--training_comment={}", comment));
    }

    if let Some(restarts) = options.cosine_restarts {
        if options.scheduler == "cosine_with_restarts" {
            args.push(format!("--lr_scheduler_num_cycles={}", restarts));
        }
    }

    if let Some(power) = options.scheduler_power {
        if options.scheduler == "polynomial" {
            args.push(format!("--lr_scheduler_power={}", power));
        }
    }

    if options.persistent_workers {
        args.push("--persistent_data_loader_workers".to_string());
    }

    if options.unet_only {
        args.push("--network_train_unet_only".to_string());
    }

    if options.text_only && !options.unet_only {
        args.push("--network_train_text_encoder_only".to_string());
    }

    if let Some(dir) = &options.log_dir {
        args.push(format!("--logging_dir={}", dir));
    }

    if let Some(reso_steps) = options.bucket_reso_steps {
        args.push(format!("--bucket_reso_steps={}", reso_steps));
    }

    if options.bucket_no_upscale {
        args.push("--bucket_no_upscale".to_string());
    }

    // random_crop cannot be honored while latents are cached; dropped
    // silently, unlike the hard color_aug conflict above.
    if options.random_crop && !options.cache_latents {
        args.push("--random_crop".to_string());
    }

    if let Some(rate) = options.caption_dropout_rate {
        args.push(format!("--caption_dropout_rate={}", rate));
    }

    if let Some(n) = options.caption_dropout_every_n_epochs {
        args.push(format!("--caption_dropout_every_n_epochs={}", n));
    }

    if let Some(rate) = options.caption_tag_dropout_rate {
        args.push(format!("--caption_tag_dropout_rate={}", rate));
    }

    if options.v2 {
        args.push("--v2".to_string());
    }

    if options.v2 && options.v_parameterization {
        args.push("--v_parameterization".to_string());
    }

    Ok(args)
}

fn require_path(path: Option<&str>, name: &str, ext_list: &[&str]) -> Result<()> {
    if !ensure_path(path, name, ext_list) {
        return Err(LaunchError::BadPath {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _root: TempDir,
        options: TrainingOptions,
    }

    // Minimal on-disk layout that passes path validation: a base model
    // file, a dataset with one 2_dog concept of 4 images, an output folder.
    fn fixture() -> Fixture {
        let root = tempdir().unwrap();
        let model = root.path().join("base.safetensors");
        fs::write(&model, b"model").unwrap();

        let img = root.path().join("images");
        let concept = img.join("2_dog");
        fs::create_dir_all(&concept).unwrap();
        for i in 0..4 {
            fs::write(concept.join(format!("{}.png", i)), b"png").unwrap();
        }

        let out = root.path().join("output");
        fs::create_dir(&out).unwrap();

        let mut options = TrainingOptions::default();
        options.base_model = model.to_str().unwrap().to_string();
        options.img_folder = img.to_str().unwrap().to_string();
        options.output_folder = out.to_str().unwrap().to_string();

        Fixture {
            _root: root,
            options,
        }
    }

    #[test]
    fn test_fixed_prefix_and_epoch_mode() {
        let fx = fixture();
        let args = build_args(&fx.options).unwrap();
        assert_eq!(args[0], "--network_module=networks.lora");
        assert!(args.contains(&format!("--pretrained_model_name_or_path={}", fx.options.base_model)));
        assert!(args.contains(&"--train_batch_size=1".to_string()));
        assert!(args.contains(&"--network_dim=128".to_string()));
        assert!(args.contains(&"--max_train_epochs=1".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--max_train_steps=")));
    }

    #[test]
    fn test_max_steps_override_skips_epoch_mode() {
        let mut fx = fixture();
        fx.options.max_steps = Some(500);
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--max_train_steps=500".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--max_train_epochs=")));
    }

    #[test]
    fn test_missing_base_model_is_fatal() {
        let mut fx = fixture();
        fx.options.base_model = "/nonexistent/base.safetensors".to_string();
        let err = build_args(&fx.options).unwrap_err();
        match err.downcast_ref::<LaunchError>() {
            Some(LaunchError::BadPath { name }) => assert_eq!(name, "base_model"),
            other => panic!("expected BadPath, got {:?}", other),
        }
    }

    #[test]
    fn test_color_aug_with_cache_latents_aborts() {
        let mut fx = fixture();
        fx.options.color_aug = true;
        assert!(fx.options.cache_latents);
        let err = build_args(&fx.options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LaunchError>(),
            Some(LaunchError::Conflict(_))
        ));
    }

    #[test]
    fn test_random_crop_silently_dropped_while_caching() {
        let mut fx = fixture();
        fx.options.random_crop = true;
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--cache_latents".to_string()));
        assert!(!args.contains(&"--random_crop".to_string()));

        fx.options.cache_latents = false;
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--random_crop".to_string()));
        assert!(!args.contains(&"--cache_latents".to_string()));
    }

    #[test]
    fn test_scheduler_specific_flags_are_gated() {
        let fx = fixture();
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--lr_scheduler_num_cycles=1".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--lr_scheduler_power=")));

        let mut fx = fixture();
        fx.options.scheduler = "polynomial".to_string();
        fx.options.scheduler_power = Some(2.0);
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--lr_scheduler_power=2".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--lr_scheduler_num_cycles=")));
    }

    #[test]
    fn test_warmup_steps_derived_from_ratio() {
        let mut fx = fixture();
        fx.options.max_steps = Some(1000);
        fx.options.warmup_lr_ratio = Some(0.05);
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--lr_warmup_steps=50".to_string()));
    }

    #[test]
    fn test_warmup_derived_from_dataset_steps() {
        let mut fx = fixture();
        // dataset: 2 repeats * 4 images = 8 steps, batch 1, 10 epochs -> 80
        fx.options.num_epochs = 10;
        fx.options.warmup_lr_ratio = Some(0.5);
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--max_train_epochs=10".to_string()));
        assert!(args.contains(&"--lr_warmup_steps=40".to_string()));
    }

    #[test]
    fn test_save_epochs_fallback() {
        let mut fx = fixture();
        fx.options.save_every_n_epochs = None;
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--save_every_n_epochs=999999".to_string()));
    }

    #[test]
    fn test_grad_acc_requires_checkpointing() {
        let mut fx = fixture();
        fx.options.gradient_acc_steps = Some(4);
        let args = build_args(&fx.options).unwrap();
        assert!(!args.iter().any(|a| a.starts_with("--gradient_accumulation_steps=")));

        fx.options.gradient_checkpointing = true;
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--gradient_accumulation_steps=4".to_string()));
        assert!(args.contains(&"--gradient_checkpointing".to_string()));
    }

    #[test]
    fn test_unet_only_suppresses_text_only() {
        let mut fx = fixture();
        fx.options.unet_only = true;
        fx.options.text_only = true;
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--network_train_unet_only".to_string()));
        assert!(!args.contains(&"--network_train_text_encoder_only".to_string()));
    }

    #[test]
    fn test_v_parameterization_requires_v2() {
        let mut fx = fixture();
        fx.options.v_parameterization = true;
        let args = build_args(&fx.options).unwrap();
        assert!(!args.contains(&"--v_parameterization".to_string()));

        fx.options.v2 = true;
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&"--v2".to_string()));
        assert!(args.contains(&"--v_parameterization".to_string()));
    }

    #[test]
    fn test_resume_weights_extension_checked() {
        let mut fx = fixture();
        let weights = PathBuf::from(&fx.options.output_folder).join("last.safetensors");
        fs::write(&weights, b"lora").unwrap();
        fx.options.lora_model_for_resume = Some(weights.to_str().unwrap().to_string());
        let args = build_args(&fx.options).unwrap();
        assert!(args.contains(&format!("--network_weights={}", weights.display())));

        fx.options.lora_model_for_resume = Some("/nonexistent/last.safetensors".to_string());
        assert!(build_args(&fx.options).is_err());
    }
}
