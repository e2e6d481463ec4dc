//! Authentication
//!
//! Checks USER/PASS arguments against the configured credential pair.

pub mod validator;

pub use validator::{validate_password, validate_user};
