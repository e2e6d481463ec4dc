//! Client management
//!
//! Per-connection session state and the control loop that drives it.

pub mod handler;
pub mod reader;
pub mod state;

pub use handler::handle_client;
pub use state::Session;
