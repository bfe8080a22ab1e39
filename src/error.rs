//! Fatal configuration errors
//!
//! Everything here aborts the run before the external trainer is ever
//! started. Recoverable conditions (a malformed dataset subfolder, an
//! unknown JSON key) are logged and skipped instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    /// A required path is missing or of the wrong kind.
    #[error("failed to find {name}, make sure you have the correct path")]
    BadPath { name: String },

    /// A JSON value could not be coerced to the field's declared type.
    #[error("attempting to load {field} from json failed as input isn't {expected}")]
    Coerce {
        field: String,
        expected: &'static str,
    },

    /// Two options that cannot be enabled together.
    #[error("{0}")]
    Conflict(String),
}
