use embassy_time::Duration;
use embedded_io::{Read, ReadReady, Write};

use crate::command::ParamValue;

/// Serial link to the module.
///
/// The driver owns the port exclusively; nothing else may write to it. Reads
/// are gated on readiness so the tick loop never blocks waiting for bytes.
pub trait Transport: Read + ReadReady + Write {}

impl<T: Read + ReadReady + Write> Transport for T {}

/// The vehicle-side configuration model, as the driver sees it.
///
/// Parameters flow both ways: the driver pushes every externally visible
/// parameter to the module on a reload, and forwards parameters the module
/// reports changed (edits made on its web configurator) back through
/// [`param_changed`](ParameterStore::param_changed).
pub trait ParameterStore {
    /// A parameter value arrived from the module. Names compare
    /// case-insensitively; unknown names are the store's problem to ignore.
    fn param_changed(&mut self, name: &str, value: &str);

    /// Walk every parameter that should be mirrored on the module side.
    fn for_each_param(&self, f: &mut dyn FnMut(&str, ParamValue<'_>));
}

/// Tunables of the protocol driver. The intervals count `poll` invocations,
/// so their wall-clock meaning follows the tick rate the driver runs at.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an in-flight command may go unanswered before the channel is
    /// forced back to idle.
    pub command_timeout: Duration,
    /// Ticks between changed-parameter (`WNXT`) rounds. 0 disables polling.
    pub param_poll_interval: u32,
    /// Ticks between listener status (`LSST`) polls. 0 disables them.
    pub socket_poll_interval: u32,
    /// Ticks after `setup` before the first full parameter push.
    pub initial_load_delay: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            command_timeout: Duration::from_millis(1500),
            param_poll_interval: 10,
            socket_poll_interval: 25,
            initial_load_delay: 50,
        }
    }

    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub const fn param_poll_interval(mut self, ticks: u32) -> Self {
        self.param_poll_interval = ticks;
        self
    }

    pub const fn socket_poll_interval(mut self, ticks: u32) -> Self {
        self.socket_poll_interval = ticks;
        self
    }

    pub const fn initial_load_delay(mut self, ticks: u32) -> Self {
        self.initial_load_delay = ticks;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
