//! Module `reader`
//!
//! Line framing for the control connection with a hard length cap. An
//! overlong line is skipped as it streams in instead of being buffered.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// One line read from the control connection.
#[derive(Debug, PartialEq)]
pub enum ControlLine {
    /// Line text without its CRLF or LF terminator.
    Line(String),
    /// Longer than the limit; its bytes were dropped.
    TooLong,
}

impl ControlLine {
    /// Command verb for logging.
    pub fn verb(&self) -> &str {
        match self {
            ControlLine::Line(text) => text.split_whitespace().next().unwrap_or(""),
            ControlLine::TooLong => "<too long>",
        }
    }
}

pub struct ControlReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    max_length: usize,
    overflowed: bool,
}

impl<R: AsyncRead + Unpin> ControlReader<R> {
    pub fn new(inner: R, max_length: usize) -> Self {
        Self::with_reader(BufReader::new(inner), max_length)
    }

    fn with_reader(reader: BufReader<R>, max_length: usize) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            max_length,
            overflowed: false,
        }
    }

    /// Reads the next line; `None` at EOF.
    ///
    /// Cancel safe: a partial line stays in `pending` for the next call.
    pub async fn next_line(&mut self) -> io::Result<Option<ControlLine>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.pending.is_empty() && !self.overflowed {
                    return Ok(None);
                }
                // unterminated last line
                return Ok(Some(self.take_line()));
            }

            let (chunk, consumed, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };

            if !self.overflowed {
                self.pending.extend_from_slice(chunk);
                // one extra byte for a trailing CR
                if self.pending.len() > self.max_length + 1 {
                    self.pending.clear();
                    self.overflowed = true;
                }
            }
            self.reader.consume(consumed);

            if complete {
                return Ok(Some(self.take_line()));
            }
        }
    }

    fn take_line(&mut self) -> ControlLine {
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if std::mem::take(&mut self.overflowed) || line.len() > self.max_length {
            return ControlLine::TooLong;
        }
        ControlLine::Line(String::from_utf8_lossy(&line).into_owned())
    }
}
