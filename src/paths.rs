//! Path validation for user-supplied model and dataset locations
//!
//! Checks are advisory: they log a diagnostic and return false, leaving
//! the decision to abort to the caller. Required paths (base model, image
//! folder, output folder) are hard failures in `command::build_args`.

use log::error;
use std::path::Path;

/// Check that `path` exists and is of the expected kind.
///
/// An empty `ext_list` means a folder is expected; a non-empty one means a
/// file with one of the given extensions (without the leading dot).
pub fn ensure_path(path: Option<&str>, name: &str, ext_list: &[&str]) -> bool {
    let expect_folder = ext_list.is_empty();

    let path = match path {
        Some(p) if !p.is_empty() => Path::new(p),
        _ => {
            error!("Failed to find {}, Please make sure path is correct.", name);
            return false;
        }
    };

    if !path.exists() {
        error!("Failed to find {}, Please make sure path is correct.", name);
        return false;
    }

    if expect_folder && path.is_file() {
        error!(
            "Path given for {} is that of a file, please select a folder.",
            name
        );
        return false;
    }

    if !expect_folder {
        if path.is_dir() {
            error!(
                "Path given for {} is that of a folder, please select a file.",
                name
            );
            return false;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if ext_list.contains(&ext.as_str()) => {}
            _ => {
                error!(
                    "Found a file for {}, however it wasn't of the accepted types: {:?}",
                    name, ext_list
                );
                return false;
            }
        }
    }

    true
}
