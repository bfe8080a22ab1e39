//! Caption tag frequency report
//!
//! Scans every caption file in the first-level dataset subfolders, counts
//! comma-separated tags and writes a `[count] tag` report sorted by
//! descending count next to the trained checkpoints. Handy for picking
//! activation tokens.

use anyhow::{Context, Result};
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::TrainingOptions;

/// Label used for the report file when no output name is configured.
const DEFAULT_LABEL: &str = "tag_frequency";

/// Write the tag occurrence report for `options.img_folder` into
/// `options.output_folder`. Returns the path of the written report.
pub fn write_tag_occurrence_file(options: &TrainingOptions) -> Result<PathBuf> {
    let label = options
        .change_output_name
        .as_deref()
        .unwrap_or(DEFAULT_LABEL);
    let occurrences = collect_tags(Path::new(&options.img_folder), &options.caption_extension)?;

    let mut sorted: Vec<(String, usize)> = occurrences.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    let mut body = format!(
        "Below is a list of keywords used during the training of {}:\n",
        label
    );
    for (tag, count) in &sorted {
        body.push_str(&format!("[{}] {}\n", count, tag));
    }

    let path = Path::new(&options.output_folder).join(format!("{}.txt", label));
    fs::write(&path, body)
        .with_context(|| format!("Failed to write tag report: {}", path.display()))?;
    info!("Wrote tag occurrence report to {}", path.display());
    Ok(path)
}

/// Count tag occurrences across all caption files under the first-level
/// subfolders of `img_folder`.
fn collect_tags(img_folder: &Path, extension: &str) -> Result<HashMap<String, usize>> {
    let mut occurrences = HashMap::new();

    let entries = fs::read_dir(img_folder)
        .with_context(|| format!("Failed to read image folder: {}", img_folder.display()))?;
    for entry in entries {
        let folder = entry?.path();
        if !folder.is_dir() {
            continue;
        }
        for file in fs::read_dir(&folder)? {
            let file = file?.path();
            if !file.is_file() || !has_extension(&file, extension) {
                continue;
            }
            let text = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read caption file: {}", file.display()))?;
            count_tags(&text, &mut occurrences);
        }
    }

    Ok(occurrences)
}

fn has_extension(file: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.');
    file.extension().and_then(|e| e.to_str()) == Some(wanted)
}

fn count_tags(caption: &str, occurrences: &mut HashMap<String, usize>) {
    for tag in caption.replace(", ", ",").split(',') {
        *occurrences.entry(tag.to_string()).or_insert(0) += 1;
    }
}
