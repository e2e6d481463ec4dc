//! Module `commands`
//!
//! Parsing of control lines into [`Command`] values, and the
//! [`CommandResult`] every handler returns.

use crate::protocol::responses::{ReplyCode, format_response};

/// A control command parsed from one client line.
///
/// Commands that take a filename keep the raw argument; validation is
/// the handler's job so that every rejection looks the same on the wire.
#[derive(Debug, PartialEq)]
pub enum Command {
    User(String),
    Pass(String),
    Pwd,
    List,
    Pasv,
    Stor(String),
    Retr(String),
    Fnrc,
    Dele(String),
    Rnfr(String),
    Rnto(String),
    Noop,
    Abor,
    Quit,
    Unknown(String),
}

impl Command {
    /// Commands allowed before login when authentication is enforced.
    pub fn allowed_before_login(&self) -> bool {
        matches!(
            self,
            Command::User(_) | Command::Pass(_) | Command::Noop | Command::Quit
        )
    }
}

/// Outcome of executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    /// Respond, then close the control connection.
    CloseConnection,
}

/// Full result of a command: status plus the exact response text.
#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success() -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(format_response(ReplyCode::Success, None)),
        }
    }

    pub fn success_with(payload: &str) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(format_response(ReplyCode::Success, Some(payload))),
        }
    }

    /// Success with a preformatted response body (LIST).
    pub fn success_raw(message: String) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Failure(reason.into()),
            message: Some(format_response(ReplyCode::Failure, None)),
        }
    }

    pub fn close() -> Self {
        Self {
            status: CommandStatus::CloseConnection,
            message: Some(format_response(ReplyCode::Close, None)),
        }
    }

    /// Reply code carried by this result.
    pub fn code(&self) -> ReplyCode {
        match self.status {
            CommandStatus::Success => ReplyCode::Success,
            CommandStatus::Failure(_) => ReplyCode::Failure,
            CommandStatus::CloseConnection => ReplyCode::Close,
        }
    }

    pub fn closes_connection(&self) -> bool {
        self.status == CommandStatus::CloseConnection
    }
}

/// Parses a raw control line into a [`Command`].
///
/// The verb is the first whitespace-delimited token, matched
/// case-insensitively; the argument is the rest of the line, trimmed.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim();
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim().to_string();

    match cmd.as_str() {
        "USER" => Command::User(arg),
        "PASS" => Command::Pass(arg),
        "PWD" => Command::Pwd,
        "LIST" => Command::List,
        "PASV" => Command::Pasv,
        "STOR" => Command::Stor(arg),
        "RETR" => Command::Retr(arg),
        "FNRC" => Command::Fnrc,
        "DELE" => Command::Dele(arg),
        "RNFR" => Command::Rnfr(arg),
        "RNTO" => Command::Rnto(arg),
        "NOOP" => Command::Noop,
        "ABOR" => Command::Abor,
        "QUIT" => Command::Quit,
        _ => Command::Unknown(trimmed.to_string()),
    }
}
