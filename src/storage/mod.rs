//! Storage
//!
//! Filename validation and the file operations behind LIST, DELE,
//! RNFR and RNTO. Transfers themselves live in `transfer`.

pub mod operations;
pub mod validation;

pub use operations::{
    delete_file, list_directory, prepare_file_retrieval, prepare_file_storage, rename_file,
    select_rename_source,
};
pub use validation::{ensure_server_root, resolve_file_path};
