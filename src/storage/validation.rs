//! Path validation
//!
//! Every filename a client sends is checked here before it is joined
//! against the server root.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

const PROHIBITED_FILENAME_CHARS: [char; 3] = ['/', '\\', '\0'];

/// Checks a client-supplied filename.
///
/// Rejects empty names, `.`/`..`, and anything containing a path
/// separator or NUL.
pub fn validate_filename(filename: &str) -> Result<(), StorageError> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(PROHIBITED_FILENAME_CHARS)
    {
        return Err(StorageError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Validates `filename` and joins it onto the server root.
pub fn resolve_file_path(server_root: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    validate_filename(filename)?;
    Ok(server_root.join(filename))
}

/// Creates the server root if it does not exist yet.
pub fn ensure_server_root(server_root: &Path) -> io::Result<()> {
    std::fs::create_dir_all(server_root)
}
