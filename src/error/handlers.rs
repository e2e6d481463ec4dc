//! Error handlers

use crate::error::types::FtpServerError;
use log::error;

/// Log an error that ends a connection or the server
pub fn handle_error(err: &FtpServerError) {
    error!("FTP server error: {}", err);
}
