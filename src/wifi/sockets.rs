//! Sockets the module holds open on behalf of the vehicle.
//!
//! The module assigns the handles; the driver only mirrors them. A TCP
//! listener is opened once with `LTCP` and supervised with periodic `LSST`
//! status polls, whose reports reconcile the local table: handles that
//! appear are opened, handles that vanish are closed.

use core::fmt::Write;

use embassy_time::Instant;
use heapless::String;

use crate::client::IchipClient;
use crate::command::response::{self, Response};
use crate::command::{CommandState, PendingCommand, MAX_BODY_LEN};
use crate::config::{ParameterStore, Transport};
use crate::error::Error;

/// How many sockets the module can serve at once.
pub const MAX_SOCKETS: usize = 4;

/// Peers the TCP listener accepts before refusing connections.
const LISTENER_BACKLOG: u8 = 4;

/// Mirror of the sockets currently open on the module.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SocketTable {
    slots: [Option<u8>; MAX_SOCKETS],
}

impl SocketTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_SOCKETS],
        }
    }

    pub fn contains(&self, handle: u8) -> bool {
        self.slots.iter().any(|slot| *slot == Some(handle))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Open handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }

    pub(crate) fn clear(&mut self) {
        self.slots = [None; MAX_SOCKETS];
    }

    fn open(&mut self, handle: u8) -> bool {
        if self.contains(handle) {
            return true;
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Bring the table in line with a status report.
    pub(crate) fn reconcile(&mut self, reported: impl Iterator<Item = u8> + Clone) {
        for slot in self.slots.iter_mut() {
            if let Some(handle) = *slot {
                if !reported.clone().any(|r| r == handle) {
                    debug!("socket {} closed", handle);
                    *slot = None;
                }
            }
        }
        for handle in reported {
            if !self.contains(handle) {
                if self.open(handle) {
                    debug!("socket {} open", handle);
                } else {
                    warn!("socket report overflows the table: {}", handle);
                }
            }
        }
    }
}

impl<T: Transport, P: ParameterStore> IchipClient<T, P> {
    /// Relay a payload to an open socket on the module.
    pub fn send_to_socket(&mut self, socket: u8, data: &str, now: Instant) -> Result<(), Error> {
        self.send_cmd(PendingCommand::socket_send(socket, data)?, now)
    }

    /// Open a TCP listener on the module and start mirroring its sockets.
    /// The granted handle arrives with the reply; status polls begin then.
    pub fn start_listener(&mut self, port: u16, now: Instant) -> Result<(), Error> {
        let mut body: String<MAX_BODY_LEN> = String::new();
        write!(body, "LTCP:{},{}", port, LISTENER_BACKLOG).map_err(|_| Error::CommandTooLong)?;
        self.send_cmd(
            PendingCommand {
                body,
                state: CommandState::GetParam,
            },
            now,
        )
    }

    /// Ask the module which sockets the listener currently serves.
    pub(crate) fn poll_socket_status(&mut self, handle: u8, now: Instant) -> Result<(), Error> {
        let mut body: String<MAX_BODY_LEN> = String::new();
        write!(body, "LSST:{}", handle).map_err(|_| Error::CommandTooLong)?;
        self.send_cmd(
            PendingCommand {
                body,
                state: CommandState::GetParam,
            },
            now,
        )
    }

    pub(crate) fn consume_listener_handle(&mut self, line: &str) {
        match response::listener_handle(line) {
            Some(handle) => {
                info!("listener up, handle {}", handle);
                self.listener = Some(handle);
            }
            None => warn!("listener request refused: {}", line),
        }
    }

    pub(crate) fn consume_socket_report(&mut self, line: &str) {
        match Response::parse(line) {
            Response::SocketList(list) => self.sockets.reconcile(list.iter()),
            _ => debug!("unusable socket status: {}", line),
        }
    }
}
