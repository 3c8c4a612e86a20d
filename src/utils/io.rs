//! File I/O primitives with consistent error handling.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Read file contents with standardized error handling.
///
/// A missing or unreadable file is reported as a configuration error carrying
/// the operation name and path, since every file read in this crate comes
/// from a user-supplied configuration value.
pub fn read_file(path: &Path, operation: &str) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("{}: {}: {}", operation, path.display(), e)))
}
