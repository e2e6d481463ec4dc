//! Error types
//!
//! Domain-specific error types for each module of the server. None of
//! them reach the client as text; a failed command is logged and
//! answered with a bare FAILURE.

use std::io;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username does not match: {0}")]
    UsernameMismatch(String),

    #[error("password does not match")]
    PasswordMismatch,

    #[error("login required")]
    NotLoggedIn,
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("no rename source selected")]
    RenameNotPending,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Data channel and passive port errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no passive port available")]
    NoAvailablePort,

    #[error("failed to bind passive listener on {0}: {1}")]
    PortBindingFailed(String, io::Error),

    #[error("no data channel registered")]
    DataChannelNotRegistered,

    #[error("data channel is busy")]
    DataChannelBusy,

    #[error("data channel closed")]
    DataChannelClosed,

    #[error("no upload pending on data channel")]
    NoPendingUpload,

    #[error("transfer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// General server error that encompasses all error types
#[derive(Debug, Error)]
pub enum FtpServerError {
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
