//! Parameter synchronization between the vehicle's configuration model and
//! the module's live parameter store.
//!
//! Changes flow both ways. The module's web configurator edits parameters
//! behind our back; `WNXT` asks for them one at a time until the module runs
//! dry. In the other direction, a reload walks the configuration model and
//! pushes every externally visible parameter onto the module.

use embassy_time::Instant;
use heapless::Vec;

use crate::client::{IchipClient, CMD_QUEUE_LEN};
use crate::command::response::Response;
use crate::command::PendingCommand;
use crate::config::{ParameterStore, Transport};
use crate::error::Error;

/// Upper bound on `WNXT` requests in one round. Terminates the conversation
/// even when the module keeps inventing changes.
pub const MAX_CHANGED_PARAMS: u8 = 32;

/// Operator-facing configuration tokens and the module parameter behind each
/// one. The console forwards these as structured settings; the mapping lives
/// here so a new token cannot silently miss its translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleParam {
    Ssid,
    Ip,
    Channel,
    Security,
    Password,
}

impl ConsoleParam {
    /// Case-insensitive lookup of an operator token.
    pub fn from_token(token: &str) -> Option<Self> {
        const TABLE: &[(&str, ConsoleParam)] = &[
            ("SSID", ConsoleParam::Ssid),
            ("IP", ConsoleParam::Ip),
            ("CHANNEL", ConsoleParam::Channel),
            ("SECURITY", ConsoleParam::Security),
            ("PWD", ConsoleParam::Password),
        ];
        TABLE
            .iter()
            .find(|(name, _)| token.eq_ignore_ascii_case(name))
            .map(|&(_, param)| param)
    }

    /// The module parameter name behind the token.
    pub const fn param_name(self) -> &'static str {
        match self {
            ConsoleParam::Ssid => "WLSI",
            ConsoleParam::Ip => "DIP",
            ConsoleParam::Channel => "WLCH",
            ConsoleParam::Security => "WLPP",
            ConsoleParam::Password => "WPWD",
        }
    }
}

impl<T: Transport, P: ParameterStore> IchipClient<T, P> {
    /// Start a changed-parameter round: ask the module for the next
    /// parameter its web configurator touched.
    pub fn poll_changed_parameters(&mut self, now: Instant) -> Result<(), Error> {
        self.wnxt_round = 1;
        self.send_cmd(PendingCommand::next_changed(), now)
    }

    /// Push every externally visible parameter of the configuration model to
    /// the module. The first command goes out immediately, the rest ride the
    /// ring.
    pub fn load_parameters(&mut self, now: Instant) {
        let mut staged: Vec<PendingCommand, CMD_QUEUE_LEN> = Vec::new();
        self.params.for_each_param(&mut |name, value| {
            match PendingCommand::set_param(name, &value) {
                Ok(cmd) => {
                    if staged.push(cmd).is_err() {
                        warn!("parameter push overflows the ring, {} dropped", name);
                    }
                }
                Err(_) => warn!("parameter {} does not fit a command line", name),
            }
        });
        for cmd in staged {
            if let Err(e) = self.send_cmd(cmd, now) {
                warn!("parameter push stopped: {:?}", e);
                break;
            }
        }
    }

    /// Apply an operator setting and cycle the link so it takes effect.
    pub fn apply_console_setting(
        &mut self,
        setting: ConsoleParam,
        value: &str,
        now: Instant,
    ) -> Result<(), Error> {
        self.set_parameter(setting.param_name(), value, now)?;
        self.send("DOWN", now)
    }

    /// Route a value line to whoever asked for it. The retained body of the
    /// in-flight command is the only request identifier this protocol has.
    pub(crate) fn consume_value_line(&mut self, asked: &PendingCommand, line: &str, now: Instant) {
        let body = asked.body.as_str();
        if body == "WNXT" {
            self.consume_changed_param(line, now);
        } else if body.starts_with("LTCP") {
            self.consume_listener_handle(line);
        } else if body.starts_with("LSST") {
            self.consume_socket_report(line);
        } else {
            // a plain NAME? readout
            match Response::parse(line) {
                Response::Param { name, value } => self.params.param_changed(name, value),
                _ => debug!("readout for {} came back empty: {}", body, line),
            }
        }
    }

    fn consume_changed_param(&mut self, line: &str, now: Instant) {
        match Response::parse(line) {
            Response::Param { name, value } => {
                self.params.param_changed(name, value);
                if self.wnxt_round < MAX_CHANGED_PARAMS {
                    self.wnxt_round += 1;
                    if self.send_cmd(PendingCommand::next_changed(), now).is_err() {
                        warn!("changed-parameter round cut short");
                        self.wnxt_round = 0;
                    }
                } else {
                    warn!("changed-parameter round hit the cap");
                    self.wnxt_round = 0;
                }
            }
            // the module is done reporting
            _ => self.wnxt_round = 0,
        }
    }
}
