//! Dataset step counting
//!
//! The trainer's dataset layout is a root folder of subfolders named
//! `{repeats}_{label}`, with the images directly inside each subfolder.
//! Total steps for a run are derived from that layout:
//! `floor(sum(repeats * images) / batch_size) * num_epochs`.

use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["png", "bmp", "gif", "jpeg", "jpg", "webp"];

/// Compute the total training step count for the dataset under `img_folder`.
///
/// Subfolders that don't follow the `{repeats}_{label}` convention are
/// skipped with a warning. A dataset with no well-formed subfolders yields
/// zero steps.
pub fn find_max_steps(img_folder: &str, batch_size: usize, num_epochs: usize) -> Result<usize> {
    let mut total = 0usize;

    let entries = fs::read_dir(img_folder)
        .with_context(|| format!("Failed to read image folder: {}", img_folder))?;
    for entry in entries {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let folder_name = entry.file_name().to_string_lossy().into_owned();
        let Some(repeats) = parse_repeats(&folder_name) else {
            warn!(
                "folder {} is not in the correct format. Format is x_name. skipping",
                folder_name
            );
            continue;
        };
        total += repeats * count_images(&entry.path())?;
    }

    Ok(total / batch_size.max(1) * num_epochs)
}

/// Extract the repeat count from a `{repeats}_{label}` folder name.
fn parse_repeats(folder_name: &str) -> Option<usize> {
    let (prefix, _label) = folder_name.split_once('_')?;
    prefix.parse::<usize>().ok()
}

fn count_images(folder: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if entry.path().is_dir() {
            continue;
        }
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext, Some(e) if IMAGE_EXTENSIONS.contains(&e.as_str())) {
            count += 1;
        }
    }
    Ok(count)
}
