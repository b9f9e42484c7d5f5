//! Shapes of the text lines the module answers with.
//!
//! The module reports best effort: a parameter readout comes back as
//! `NAME="value"`, a listener status poll as `I/(<id>,<id>,...)`, and
//! everything administrative as a bare status line (`I/OK`, `I/ERROR (203)`).
//! Any well-formed line doubles as an acknowledgement.

/// One parsed response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response<'a> {
    /// `NAME="value"`: a parameter readout or changed-parameter report.
    Param { name: &'a str, value: &'a str },
    /// `I/(<id>,<id>,...)`: sockets a listener currently serves.
    SocketList(SocketList<'a>),
    /// Any other line. Acts as a plain acknowledgement and, during a
    /// changed-parameter round, as the end-of-changes sentinel.
    Status(&'a str),
}

impl<'a> Response<'a> {
    /// Classify a line. Total: every line falls into one of the shapes.
    pub fn parse(line: &'a str) -> Self {
        if let Some((name, rest)) = line.split_once('=') {
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric()) {
                let value = rest
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(rest);
                return Response::Param { name, value };
            }
        }
        if let Some(inner) = line.strip_prefix("I/(").and_then(|r| r.strip_suffix(')')) {
            return Response::SocketList(SocketList(inner));
        }
        Response::Status(line)
    }
}

/// Lazily parsed `<id>,<id>,...` socket list body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketList<'a>(&'a str);

impl<'a> SocketList<'a> {
    /// Socket handles in report order. Tokens that do not parse are skipped.
    pub fn iter(&self) -> impl Iterator<Item = u8> + Clone + 'a {
        self.0.split(',').filter_map(|token| token.trim().parse().ok())
    }
}

/// `I/<handle>`: the handle a listener request came back with.
pub fn listener_handle(line: &str) -> Option<u8> {
    line.strip_prefix("I/").and_then(|rest| rest.trim().parse().ok())
}

/// Structured view of a socket-send directive,
/// `SSND%%:<socket>,<len>:<payload>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketDirective<'a> {
    pub socket: u8,
    pub len: usize,
    pub payload: &'a str,
}

impl<'a> SocketDirective<'a> {
    pub fn parse(body: &'a str) -> Option<Self> {
        let rest = body.strip_prefix("SSND%%:")?;
        let (head, payload) = rest.split_once(':')?;
        let (socket, len) = head.split_once(',')?;
        Some(Self {
            socket: socket.parse().ok()?,
            len: len.parse().ok()?,
            payload,
        })
    }
}
