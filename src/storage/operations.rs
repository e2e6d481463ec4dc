//! Storage operations
//!
//! File system operations for LIST, DELE, RNFR and RNTO, plus the
//! pre-checks STOR and RETR run before handing a path to the data channel.

use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::storage::validation::resolve_file_path;

/// Lists the direct children of the server root as `d:name` / `f:name`
/// entries, sorted by name.
pub fn list_directory(server_root: &Path) -> Result<Vec<String>, StorageError> {
    let entries = fs::read_dir(server_root).map_err(|e| {
        error!(
            "Failed to list directory {}: {}",
            server_root.display(),
            e
        );
        StorageError::from(e)
    })?;

    let mut listing = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        // follows symlinks, so a link to a directory lists as `d:`
        let is_dir = entry.path().is_dir();
        listing.push((name, is_dir));
    }
    listing.sort_by(|a, b| a.0.cmp(&b.0));

    let listing: Vec<String> = listing
        .into_iter()
        .map(|(name, is_dir)| format!("{}:{}", if is_dir { "d" } else { "f" }, name))
        .collect();

    info!(
        "Listed directory {} - {} entries",
        server_root.display(),
        listing.len()
    );

    Ok(listing)
}

/// Resolves the target of a download; it must be an existing regular file.
pub fn prepare_file_retrieval(server_root: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let file_path = resolve_file_path(server_root, filename)?;
    if !file_path.is_file() {
        return Err(StorageError::NotFound(filename.to_string()));
    }
    Ok(file_path)
}

/// Resolves the target of an upload; nothing may exist there yet.
pub fn prepare_file_storage(server_root: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let file_path = resolve_file_path(server_root, filename)?;
    if file_path.exists() {
        return Err(StorageError::AlreadyExists(filename.to_string()));
    }
    Ok(file_path)
}

/// Deletes a file from the server root.
pub fn delete_file(server_root: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let file_path = resolve_file_path(server_root, filename)?;

    if !file_path.exists() {
        return Err(StorageError::NotFound(filename.to_string()));
    }

    fs::remove_file(&file_path).map_err(|e| {
        error!("Failed to delete file {}: {}", file_path.display(), e);
        StorageError::from(e)
    })?;

    info!("Deleted file {}", file_path.display());
    Ok(file_path)
}

/// Resolves the source of a rename; it must exist.
pub fn select_rename_source(server_root: &Path, filename: &str) -> Result<PathBuf, StorageError> {
    let file_path = resolve_file_path(server_root, filename)?;
    if !file_path.exists() {
        return Err(StorageError::NotFound(filename.to_string()));
    }
    Ok(file_path)
}

/// Renames `source` to `filename` inside the server root.
///
/// Fails if the source vanished since RNFR or the target already exists.
pub fn rename_file(
    server_root: &Path,
    source: &Path,
    filename: &str,
) -> Result<PathBuf, StorageError> {
    let target = resolve_file_path(server_root, filename)?;

    if !source.exists() {
        return Err(StorageError::NotFound(source.display().to_string()));
    }
    if target.exists() {
        return Err(StorageError::AlreadyExists(filename.to_string()));
    }

    fs::rename(source, &target)?;
    info!("Renamed {} -> {}", source.display(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root_with(files: &[&str], dirs: &[&str]) -> TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for f in files {
            fs::write(tmp.path().join(f), b"data").unwrap();
        }
        for d in dirs {
            fs::create_dir(tmp.path().join(d)).unwrap();
        }
        tmp
    }

    #[test]
    fn test_list_marks_types_and_skips_dot_entries() {
        let tmp = root_with(&["b.txt", "a.txt"], &["docs"]);
        let listing = list_directory(tmp.path()).unwrap();
        assert_eq!(listing, vec!["f:a.txt", "f:b.txt", "d:docs"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_follows_directory_symlinks() {
        let tmp = root_with(&["plain.txt"], &["real"]);
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("plain.txt"), tmp.path().join("alias")).unwrap();

        let listing = list_directory(tmp.path()).unwrap();
        assert_eq!(listing, vec!["f:alias", "d:link", "f:plain.txt", "d:real"]);
    }

    #[test]
    fn test_list_empty_root() {
        let tmp = root_with(&[], &[]);
        assert!(list_directory(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_file_leaves_root_untouched() {
        let tmp = root_with(&["keep.txt"], &[]);
        assert!(matches!(
            delete_file(tmp.path(), "missing.txt"),
            Err(StorageError::NotFound(_))
        ));
        assert!(tmp.path().join("keep.txt").exists());
    }

    #[test]
    fn test_delete_existing_file() {
        let tmp = root_with(&["gone.txt"], &[]);
        delete_file(tmp.path(), "gone.txt").unwrap();
        assert!(!tmp.path().join("gone.txt").exists());
    }

    #[test]
    fn test_delete_directory_fails() {
        let tmp = root_with(&[], &["docs"]);
        assert!(delete_file(tmp.path(), "docs").is_err());
        assert!(tmp.path().join("docs").is_dir());
    }

    #[test]
    fn test_prepare_storage_and_retrieval() {
        let tmp = root_with(&["exists.txt"], &["docs"]);
        assert!(prepare_file_storage(tmp.path(), "new.txt").is_ok());
        assert!(matches!(
            prepare_file_storage(tmp.path(), "exists.txt"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(prepare_file_retrieval(tmp.path(), "exists.txt").is_ok());
        assert!(prepare_file_retrieval(tmp.path(), "new.txt").is_err());
        assert!(prepare_file_retrieval(tmp.path(), "docs").is_err());
    }

    #[test]
    fn test_rename_flow() {
        let tmp = root_with(&["x.txt", "taken.txt"], &[]);
        let source = select_rename_source(tmp.path(), "x.txt").unwrap();

        assert!(matches!(
            rename_file(tmp.path(), &source, "taken.txt"),
            Err(StorageError::AlreadyExists(_))
        ));

        rename_file(tmp.path(), &source, "y.txt").unwrap();
        assert!(!tmp.path().join("x.txt").exists());
        assert!(tmp.path().join("y.txt").exists());

        // the source is gone now
        assert!(rename_file(tmp.path(), &source, "z.txt").is_err());
    }

    #[test]
    fn test_rename_source_must_exist() {
        let tmp = root_with(&[], &[]);
        assert!(select_rename_source(tmp.path(), "nope.txt").is_err());
    }
}
