//! Wire framing for the AT+i command set.
//!
//! Every outbound frame is the fixed `AT+i` marker, a command body and a
//! terminating CR. The module answers in free text, one line per command,
//! terminated by CR (some firmware revisions append LF).

pub mod digest;
pub mod response;

use core::fmt::Write;

use heapless::{String, Vec};

use crate::error::Error;

/// Fixed marker the module firmware expects in front of every command body.
pub const COMMAND_PREFIX: &[u8; 4] = b"AT+i";

/// Command line termination character (CR).
pub const LINE_TERM_CHAR: u8 = 13;
/// Response formatting character (LF).
pub const FORMAT_CHAR: u8 = 10;

/// Longest accepted command body. Mirrors the 80 character console line
/// buffer; the module itself refuses longer lines.
pub const MAX_BODY_LEN: usize = 80;

/// `AT+i` + body + CR.
pub const MAX_FRAME_LEN: usize = COMMAND_PREFIX.len() + MAX_BODY_LEN + 1;

/// The reply the module owes us for the frame currently on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandState {
    /// Channel free. A command carrying this expects no reply at all.
    #[default]
    Idle,
    /// A set-parameter acknowledgement.
    SetParam,
    /// A parameter value line, `NAME="value"`.
    GetParam,
    /// A socket-send acknowledgement.
    SendSocket,
}

/// One command and the reply shape that completes it. Immutable once built;
/// consumed exactly once, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingCommand {
    pub body: String<MAX_BODY_LEN>,
    pub state: CommandState,
}

impl PendingCommand {
    pub fn new(body: &str, state: CommandState) -> Result<Self, Error> {
        let body = String::try_from(body).map_err(|_| Error::CommandTooLong)?;
        Ok(Self { body, state })
    }

    /// An already formatted body, expecting the plain acknowledgement most
    /// administrative commands answer with.
    pub fn raw(body: &str) -> Result<Self, Error> {
        Self::new(body, CommandState::SetParam)
    }

    /// `NAME="value"`, the set-parameter form.
    pub fn set_param(name: &str, value: &ParamValue<'_>) -> Result<Self, Error> {
        let mut body = String::new();
        write!(body, "{}=\"{}\"", name, value).map_err(|_| Error::CommandTooLong)?;
        Ok(Self {
            body,
            state: CommandState::SetParam,
        })
    }

    /// `NAME?`, the parameter readout form.
    pub fn get_param(name: &str) -> Result<Self, Error> {
        let mut body = String::new();
        write!(body, "{}?", name).map_err(|_| Error::CommandTooLong)?;
        Ok(Self {
            body,
            state: CommandState::GetParam,
        })
    }

    /// `WNXT`, asking for the next parameter the module changed on its own.
    pub fn next_changed() -> Self {
        Self {
            body: String::try_from("WNXT").unwrap(),
            state: CommandState::GetParam,
        }
    }

    /// `SSND%%:<socket, 3 digits>,<len>:<payload>`, the socket relay form.
    pub fn socket_send(socket: u8, data: &str) -> Result<Self, Error> {
        let mut body = String::new();
        write!(body, "SSND%%:{:03},{}:{}", socket, data.len(), data)
            .map_err(|_| Error::CommandTooLong)?;
        Ok(Self {
            body,
            state: CommandState::SendSocket,
        })
    }

    /// The on-wire frame for this command.
    pub fn frame(&self) -> Vec<u8, MAX_FRAME_LEN> {
        let mut frame = Vec::new();
        frame.extend_from_slice(COMMAND_PREFIX).unwrap();
        frame.extend_from_slice(self.body.as_bytes()).unwrap();
        frame.push(LINE_TERM_CHAR).unwrap();
        frame
    }
}

/// A parameter value on its way to the module. Numeric variants format as
/// decimal text at encode time, floats with an explicit digit count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue<'a> {
    Text(&'a str),
    I32(i32),
    U32(u32),
    I16(i16),
    U16(u16),
    U8(u8),
    /// `(value, digits after the decimal point)`.
    Float(f32, u8),
}

impl core::fmt::Display for ParamValue<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            ParamValue::Text(v) => f.write_str(v),
            ParamValue::I32(v) => write!(f, "{}", v),
            ParamValue::U32(v) => write!(f, "{}", v),
            ParamValue::I16(v) => write!(f, "{}", v),
            ParamValue::U16(v) => write!(f, "{}", v),
            ParamValue::U8(v) => write!(f, "{}", v),
            ParamValue::Float(v, digits) => write!(f, "{:.*}", digits as usize, v),
        }
    }
}

impl<'a> From<&'a str> for ParamValue<'a> {
    fn from(v: &'a str) -> Self {
        ParamValue::Text(v)
    }
}

impl From<i32> for ParamValue<'static> {
    fn from(v: i32) -> Self {
        ParamValue::I32(v)
    }
}

impl From<u32> for ParamValue<'static> {
    fn from(v: u32) -> Self {
        ParamValue::U32(v)
    }
}

impl From<i16> for ParamValue<'static> {
    fn from(v: i16) -> Self {
        ParamValue::I16(v)
    }
}

impl From<u16> for ParamValue<'static> {
    fn from(v: u16) -> Self {
        ParamValue::U16(v)
    }
}

impl From<u8> for ParamValue<'static> {
    fn from(v: u8) -> Self {
        ParamValue::U8(v)
    }
}

impl From<(f32, u8)> for ParamValue<'static> {
    fn from((v, digits): (f32, u8)) -> Self {
        ParamValue::Float(v, digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_wraps_body_in_prefix_and_cr() {
        let cmd = PendingCommand::raw("WNXT").unwrap();
        assert_eq!(cmd.frame().as_slice(), b"AT+iWNXT\r");
    }

    #[test]
    fn set_param_quotes_the_value() {
        let cmd = PendingCommand::set_param("FOO", &ParamValue::I16(42)).unwrap();
        assert_eq!(cmd.body.as_str(), "FOO=\"42\"");
        assert_eq!(cmd.state, CommandState::SetParam);
    }

    #[test]
    fn set_param_formats_floats_with_fixed_precision() {
        let cmd = PendingCommand::set_param("VOLT", &ParamValue::Float(13.2, 1)).unwrap();
        assert_eq!(cmd.body.as_str(), "VOLT=\"13.2\"");

        let cmd = PendingCommand::set_param("VOLT", &ParamValue::Float(13.0, 3)).unwrap();
        assert_eq!(cmd.body.as_str(), "VOLT=\"13.000\"");
    }

    #[test]
    fn set_param_formats_signed_and_unsigned() {
        let cmd = PendingCommand::set_param("TORQ", &ParamValue::I32(-3000)).unwrap();
        assert_eq!(cmd.body.as_str(), "TORQ=\"-3000\"");

        let cmd = PendingCommand::set_param("RPM", &ParamValue::U16(6500)).unwrap();
        assert_eq!(cmd.body.as_str(), "RPM=\"6500\"");
    }

    #[test]
    fn get_param_appends_question_mark() {
        let cmd = PendingCommand::get_param("WLSI").unwrap();
        assert_eq!(cmd.body.as_str(), "WLSI?");
        assert_eq!(cmd.state, CommandState::GetParam);
    }

    #[test]
    fn socket_send_pads_socket_and_counts_bytes() {
        let cmd = PendingCommand::socket_send(3, "hi").unwrap();
        assert_eq!(cmd.body.as_str(), "SSND%%:003,2:hi");
        assert_eq!(cmd.state, CommandState::SendSocket);
    }

    #[test]
    fn overlong_body_is_rejected_not_truncated() {
        let long = core::str::from_utf8(&[b'x'; MAX_BODY_LEN + 1]).unwrap();
        assert_eq!(PendingCommand::raw(long), Err(Error::CommandTooLong));

        // a value that would overflow once quoted is rejected too
        let almost = core::str::from_utf8(&[b'y'; MAX_BODY_LEN - 4]).unwrap();
        assert_eq!(
            PendingCommand::set_param("NAME", &ParamValue::Text(almost)),
            Err(Error::CommandTooLong)
        );
    }

    #[test]
    fn body_at_the_cap_is_accepted() {
        let exact = core::str::from_utf8(&[b'x'; MAX_BODY_LEN]).unwrap();
        let cmd = PendingCommand::raw(exact).unwrap();
        assert_eq!(cmd.frame().len(), MAX_FRAME_LEN);
    }
}
