//! Reassembly of response lines from the raw UART byte stream.
//!
//! Bytes accumulate here until a terminator shows up; the completed line is
//! handed out with the terminator stripped. Consecutive terminators collapse,
//! so a CRLF pair yields exactly one line and stray blank lines never reach
//! the parser.

use heapless::Vec;

use super::{FORMAT_CHAR, LINE_TERM_CHAR};

/// Capacity of the reassembly buffer. Lines queue up here between ticks, so
/// it holds a few of them; parameter reports stay well under one hundred
/// bytes each.
pub const RX_BUF_LEN: usize = 256;

/// Longest response line surfaced to the parser.
pub const MAX_LINE_LEN: usize = 128;

/// Outcome of one reassembly pass.
#[derive(Debug, PartialEq, Eq)]
pub enum DigestResult {
    /// No complete line buffered yet.
    None,
    /// One complete line, terminator stripped.
    Line(Vec<u8, MAX_LINE_LEN>),
    /// A line outgrew the buffer and was thrown away; reassembly resumes at
    /// the next terminator.
    Overrun,
}

#[derive(Debug, Default)]
pub struct LineDigester {
    buf: Vec<u8, RX_BUF_LEN>,
    /// Discarding until the next terminator, after the buffer filled mid-line.
    skipping: bool,
    /// Bytes of already-complete lines that still sit in front of a pending
    /// overrun report. `Some(0)` means the report is due now.
    overrun_after: Option<usize>,
}

impl LineDigester {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            skipping: false,
            overrun_after: None,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.skipping = false;
        self.overrun_after = None;
    }

    /// Feed raw bytes from the UART.
    pub fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    fn push(&mut self, byte: u8) {
        let term = byte == LINE_TERM_CHAR || byte == FORMAT_CHAR;
        if self.skipping {
            if term {
                self.skipping = false;
            }
            return;
        }
        if self.buf.push(byte).is_err() {
            // drop the partial tail, keep any complete lines in front of it
            let keep = match self
                .buf
                .iter()
                .rposition(|&b| b == LINE_TERM_CHAR || b == FORMAT_CHAR)
            {
                Some(pos) => pos + 1,
                None => 0,
            };
            self.buf.truncate(keep);
            self.skipping = !term;
            self.overrun_after.get_or_insert(keep);
        }
    }

    /// Surface the next complete line, oldest first. Overruns are reported
    /// in their place in the stream, once each.
    pub fn digest(&mut self) -> DigestResult {
        // swallow leading terminators so CRLF pairs yield a single line
        while let Some(&byte) = self.buf.first() {
            if byte != LINE_TERM_CHAR && byte != FORMAT_CHAR {
                break;
            }
            self.consume(1);
        }

        if self.overrun_after == Some(0) {
            self.overrun_after = None;
            return DigestResult::Overrun;
        }

        let Some(end) = self
            .buf
            .iter()
            .position(|&b| b == LINE_TERM_CHAR || b == FORMAT_CHAR)
        else {
            return DigestResult::None;
        };

        let result = match Vec::from_slice(&self.buf[..end]) {
            Ok(line) => DigestResult::Line(line),
            // complete but wider than any legal response line
            Err(()) => DigestResult::Overrun,
        };
        self.consume(end + 1);
        result
    }

    fn consume(&mut self, count: usize) {
        self.buf.rotate_left(count);
        self.buf.truncate(self.buf.len() - count);
        if let Some(ahead) = self.overrun_after.as_mut() {
            *ahead = ahead.saturating_sub(count);
        }
    }
}
