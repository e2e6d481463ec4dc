//! Error handling
//!
//! Defines error types and how fatal ones are reported.

pub mod handlers;
pub mod types;

pub use types::*;
