//! Reply codes and response formatting
//!
//! The wire uses three literal tokens rather than RFC 959 codes.

use std::fmt;

/// Line terminator for every response line
pub const LINE_BREAK: &str = "\r\n";

/// Reply code sent at the start of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Success,
    Failure,
    Close,
}

impl ReplyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyCode::Success => "240",
            ReplyCode::Failure => "140",
            ReplyCode::Close => "520",
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format a single-line response: `CODE` or `CODE payload`, CRLF-terminated.
pub fn format_response(code: ReplyCode, payload: Option<&str>) -> String {
    match payload {
        Some(payload) => format!("{} {}{}", code, payload, LINE_BREAK),
        None => format!("{}{}", code, LINE_BREAK),
    }
}

/// Format a LIST response: the code on its own line, then one entry per
/// line. Entries are joined with CRLF and the response line terminator
/// follows the last one.
pub fn format_listing(entries: &[String]) -> String {
    if entries.is_empty() {
        return format_response(ReplyCode::Success, None);
    }
    format!(
        "{}{}{}{}",
        ReplyCode::Success,
        LINE_BREAK,
        entries.join(LINE_BREAK),
        LINE_BREAK
    )
}
