//! Authentication validator
//!
//! The server has exactly one account, taken from [`ServerConfig`].

use crate::config::ServerConfig;
use crate::error::AuthError;

/// Validates that the given username is the configured one.
pub fn validate_user(username: &str, config: &ServerConfig) -> Result<(), AuthError> {
    if username == config.username {
        Ok(())
    } else {
        Err(AuthError::UsernameMismatch(username.to_string()))
    }
}

/// Validates that the given password is the configured one.
pub fn validate_password(password: &str, config: &ServerConfig) -> Result<(), AuthError> {
    if password == config.password {
        Ok(())
    } else {
        Err(AuthError::PasswordMismatch)
    }
}
