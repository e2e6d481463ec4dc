//! Control protocol
//!
//! Command parsing, reply codes and the command dispatcher.

pub mod commands;
pub mod handlers;
pub mod responses;

pub use commands::{Command, CommandResult, CommandStatus, parse_command};
pub use handlers::handle_command;
pub use responses::ReplyCode;
