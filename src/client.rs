//! The protocol client: one command on the wire at a time, a bounded ring of
//! commands waiting behind it, and a tick-driven pump that keeps the channel
//! moving even when the module stops answering.

use embassy_time::Instant;
use embedded_io::{Read as _, ReadReady as _, Write as _};
use heapless::spsc::Queue;

use crate::command::digest::{DigestResult, LineDigester};
use crate::command::{CommandState, ParamValue, PendingCommand};
use crate::config::{Config, ParameterStore, Transport};
use crate::error::Error;
use crate::wifi::ap::Provisioner;
use crate::wifi::sockets::SocketTable;

/// Slots in the pending-command ring. One slot stays free, so 63 commands
/// can wait behind the one on the wire.
pub const CMD_QUEUE_LEN: usize = 64;

/// The command currently on the wire, and when it went out.
#[derive(Debug)]
struct InFlight {
    cmd: PendingCommand,
    sent_at: Instant,
}

/// Messages the device registry routes to this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    /// Set a single module parameter to a single value.
    SetParameter { name: &'a str, value: &'a str },
    /// Push the whole configuration model to the module.
    ReloadParameters,
    /// Forward an already formatted command body verbatim.
    Command(&'a str),
}

/// Driver for the iChip/WiReach module on a dedicated UART.
///
/// Strictly half duplex: at most one command is outstanding, replies match
/// commands in submission order, and the module gets a bounded time to answer
/// before the channel is forced idle again. Waiting is represented as state;
/// nothing here suspends or blocks.
pub struct IchipClient<T: Transport, P: ParameterStore> {
    pub(crate) serial: T,
    pub(crate) params: P,
    config: Config,

    state: CommandState,
    in_flight: Option<InFlight>,
    queue: Queue<PendingCommand, CMD_QUEUE_LEN>,
    digester: LineDigester,

    pub(crate) sockets: SocketTable,
    pub(crate) listener: Option<u8>,
    pub(crate) provisioner: Option<Provisioner>,
    /// `WNXT` commands issued in the current changed-parameter round.
    pub(crate) wnxt_round: u8,

    initialized: bool,
    tick: u32,
    did_param_load: bool,
}

impl<T: Transport, P: ParameterStore> IchipClient<T, P> {
    pub fn new(serial: T, params: P, config: Config) -> Self {
        Self {
            serial,
            params,
            config,
            state: CommandState::Idle,
            in_flight: None,
            queue: Queue::new(),
            digester: LineDigester::new(),
            sockets: SocketTable::new(),
            listener: None,
            provisioner: None,
            wnxt_round: 0,
            initialized: false,
            tick: 0,
            did_param_load: false,
        }
    }

    /// Put the protocol machine into a known state and open the channel for
    /// submissions.
    ///
    /// The owner of the hardware has already brought the UART up at
    /// [`DEFAULT_BAUD_RATE`](crate::DEFAULT_BAUD_RATE) and released the
    /// module's reset and mode select lines.
    pub fn setup(&mut self) {
        info!("iChip driver up");
        self.state = CommandState::Idle;
        self.in_flight = None;
        while self.queue.dequeue().is_some() {}
        self.digester.reset();
        self.sockets.clear();
        self.listener = None;
        self.provisioner = None;
        self.wnxt_round = 0;
        self.tick = 0;
        self.did_param_load = false;
        self.initialized = true;
    }

    /// Submit a raw command body, expecting the set-parameter style
    /// acknowledgement most commands answer with.
    pub fn send(&mut self, body: &str, now: Instant) -> Result<(), Error> {
        self.send_cmd(PendingCommand::raw(body)?, now)
    }

    /// Submit a command: transmitted immediately when the channel is free,
    /// parked in the ring otherwise. `now` stamps the transmit time for the
    /// timeout budget.
    pub fn send_cmd(&mut self, cmd: PendingCommand, now: Instant) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::Uninitialized);
        }
        if self.state != CommandState::Idle {
            debug!("buffer cmd: {}", cmd.body.as_str());
            return self.queue.enqueue(cmd).map_err(|_| Error::QueueFull);
        }
        self.transmit(cmd, now)
    }

    pub(crate) fn transmit(&mut self, cmd: PendingCommand, now: Instant) -> Result<(), Error> {
        self.serial
            .write_all(&cmd.frame())
            .map_err(|_| Error::Serial)?;
        debug!("send cmd: {}", cmd.body.as_str());
        self.state = cmd.state;
        self.in_flight = match cmd.state {
            // fire and forget, the channel stays free
            CommandState::Idle => None,
            _ => Some(InFlight { cmd, sent_at: now }),
        };
        Ok(())
    }

    /// Advance the protocol machine. Invoked by the periodic tick source.
    ///
    /// Bounded work per call: drain whatever bytes the UART holds, consume at
    /// most one complete response line, enforce the timeout budget, and send
    /// at most one command. `now` must be monotonic across calls.
    pub fn poll(&mut self, now: Instant) -> Result<(), Error> {
        if !self.initialized {
            return Err(Error::Uninitialized);
        }
        self.tick = self.tick.wrapping_add(1);

        let mut verdict = self.drain_serial();
        if verdict.is_ok() {
            verdict = match self.digester.digest() {
                DigestResult::Line(line) => self.handle_line(&line, now),
                DigestResult::Overrun => {
                    warn!("response line overran the buffer, dropped");
                    Err(Error::MalformedResponse)
                }
                DigestResult::None => self.check_timeout(now),
            };
        }
        self.pump(now);
        verdict
    }

    /// Drop every queued-but-unsent command and force the channel idle. A
    /// command already on the wire cannot be recalled; its late reply (if
    /// any) is dropped as unsolicited.
    pub fn flush_pending(&mut self) {
        while self.queue.dequeue().is_some() {}
        self.in_flight = None;
        self.state = CommandState::Idle;
        self.wnxt_round = 0;
    }

    /// Entry point for the device registry's typed messages.
    pub fn handle_message(&mut self, msg: Message<'_>, now: Instant) -> Result<(), Error> {
        match msg {
            Message::SetParameter { name, value } => self.set_parameter(name, value, now),
            Message::ReloadParameters => {
                self.load_parameters(now);
                Ok(())
            }
            Message::Command(body) => self.send(body, now),
        }
    }

    /// Set a module parameter. Values format per [`ParamValue`]: plain text,
    /// decimal integers, or fixed-precision floats.
    pub fn set_parameter<'a>(
        &mut self,
        name: &str,
        value: impl Into<ParamValue<'a>>,
        now: Instant,
    ) -> Result<(), Error> {
        self.send_cmd(PendingCommand::set_param(name, &value.into())?, now)
    }

    /// Ask the module for one parameter by name. The value comes back through
    /// [`ParameterStore::param_changed`].
    pub fn request_parameter(&mut self, name: &str, now: Instant) -> Result<(), Error> {
        self.send_cmd(PendingCommand::get_param(name)?, now)
    }

    /// Reply currently awaited; `Idle` when the channel is free.
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Commands parked behind the one on the wire.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Sockets the module currently serves.
    pub fn sockets(&self) -> &SocketTable {
        &self.sockets
    }

    /// Handle of the TCP listener, once the module has granted one.
    pub fn listener(&self) -> Option<u8> {
        self.listener
    }

    /// Tear down and hand back the injected collaborators.
    pub fn release(self) -> (T, P) {
        (self.serial, self.params)
    }

    /// Pull whatever the UART holds into the line reassembly buffer.
    fn drain_serial(&mut self) -> Result<(), Error> {
        let mut chunk = [0u8; 32];
        loop {
            match self.serial.read_ready() {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(_) => return Err(Error::Serial),
            }
            let read = self.serial.read(&mut chunk).map_err(|_| Error::Serial)?;
            if read == 0 {
                return Ok(());
            }
            self.digester.extend(&chunk[..read]);
        }
    }

    fn handle_line(&mut self, raw: &[u8], now: Instant) -> Result<(), Error> {
        let Ok(line) = core::str::from_utf8(raw) else {
            warn!("undecodable response: {:?}", crate::fmt::Bytes(raw));
            return Err(Error::MalformedResponse);
        };
        trace!("recv: {}", line);

        let Some(in_flight) = self.in_flight.take() else {
            // nobody asked; the module chats on its own after resets
            debug!("unsolicited, dropped: {}", line);
            return Ok(());
        };
        let awaited = self.state;
        self.state = CommandState::Idle;

        if awaited == CommandState::GetParam {
            self.consume_value_line(&in_flight.cmd, line, now);
        }
        // SetParam / SendSocket replies are success-only, nothing to deliver
        Ok(())
    }

    fn check_timeout(&mut self, now: Instant) -> Result<(), Error> {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return Ok(());
        };
        if now - in_flight.sent_at <= self.config.command_timeout {
            return Ok(());
        }
        warn!("no answer for cmd: {}", in_flight.cmd.body.as_str());
        self.in_flight = None;
        self.state = CommandState::Idle;
        Err(Error::ResponseTimeout)
    }

    /// One housekeeping send, if the channel is free and something is due.
    fn pump(&mut self, now: Instant) {
        if self.state != CommandState::Idle {
            return;
        }
        // parked submissions keep their order and go first
        if let Some(cmd) = self.queue.dequeue() {
            if let Err(e) = self.transmit(cmd, now) {
                warn!("queued command lost on write: {:?}", e);
            }
            return;
        }
        // provisioning owns the channel until its sequence is done
        if self.provisioner.is_some() {
            self.step_provisioner(now);
            return;
        }
        if !self.did_param_load && self.tick >= self.config.initial_load_delay {
            self.did_param_load = true;
            self.load_parameters(now);
            return;
        }
        if self.config.param_poll_interval != 0 && self.tick % self.config.param_poll_interval == 0
        {
            if let Err(e) = self.poll_changed_parameters(now) {
                warn!("changed-parameter poll skipped: {:?}", e);
            }
            return;
        }
        if let Some(handle) = self.listener {
            if self.config.socket_poll_interval != 0
                && self.tick % self.config.socket_poll_interval == 0
            {
                if let Err(e) = self.poll_socket_status(handle, now) {
                    warn!("listener status poll skipped: {:?}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{at, MockParams, MockSerial};

    fn client() -> IchipClient<MockSerial, MockParams> {
        let config = Config::new()
            .param_poll_interval(0)
            .socket_poll_interval(0)
            .initial_load_delay(u32::MAX);
        let mut client = IchipClient::new(MockSerial::new(), MockParams::default(), config);
        client.setup();
        client
    }

    #[test]
    fn rejects_commands_before_setup() {
        let mut client = IchipClient::new(
            MockSerial::new(),
            MockParams::default(),
            Config::default(),
        );
        assert_eq!(client.send("FD", at(0)), Err(Error::Uninitialized));
        assert_eq!(client.poll(at(0)), Err(Error::Uninitialized));
        assert!(client.serial.tx.is_empty());
    }

    #[test]
    fn idle_submission_goes_out_in_the_same_call() {
        let mut client = client();
        client.send("RPG=secret", at(0)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iRPG=secret\r");
        assert_eq!(client.state(), CommandState::SetParam);
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn busy_submission_is_parked_not_written() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        client.serial.take_tx();

        client.send("B", at(0)).unwrap();
        assert!(client.serial.tx.is_empty());
        assert_eq!(client.pending(), 1);
    }

    #[test]
    fn responses_complete_commands_in_submission_order() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        client.send("B", at(0)).unwrap();
        client.send("C", at(0)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iA\r");

        client.serial.answer("I/OK");
        client.poll(at(10)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iB\r");

        client.serial.answer("I/OK");
        client.poll(at(20)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iC\r");

        client.serial.answer("I/OK");
        client.poll(at(30)).unwrap();
        assert!(client.serial.tx.is_empty());
        assert_eq!(client.state(), CommandState::Idle);
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn saturated_ring_refuses_without_overwriting() {
        let mut client = client();
        client.send("HEAD", at(0)).unwrap();
        for i in 0..(CMD_QUEUE_LEN - 1) {
            assert_eq!(client.send("Q", at(0)), Ok(()), "slot {}", i);
        }
        assert_eq!(client.send("OVER", at(0)), Err(Error::QueueFull));
        assert_eq!(client.pending(), CMD_QUEUE_LEN - 1);

        // the head of the line is untouched by the refused submission
        client.serial.take_tx();
        client.serial.answer("I/OK");
        client.poll(at(1)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iQ\r");
    }

    #[test]
    fn unsolicited_line_is_dropped_without_state_change() {
        let mut client = client();
        client.serial.answer("I/BOOT");
        assert_eq!(client.poll(at(0)), Ok(()));
        assert_eq!(client.state(), CommandState::Idle);
        assert!(client.serial.tx.is_empty());
    }

    #[test]
    fn timeout_frees_the_channel_and_reports_once() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        client.send("B", at(0)).unwrap();
        client.serial.take_tx();

        // within budget: still waiting
        assert_eq!(client.poll(at(1500)), Ok(()));
        assert!(client.serial.tx.is_empty());

        // budget blown: A is abandoned, B goes out, one report
        assert_eq!(client.poll(at(1501)), Err(Error::ResponseTimeout));
        assert_eq!(client.serial.take_tx(), "AT+iB\r");
        assert_eq!(client.state(), CommandState::SetParam);

        assert_eq!(client.poll(at(1600)), Ok(()));
    }

    #[test]
    fn timeout_with_empty_queue_returns_to_idle() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        assert_eq!(client.poll(at(2000)), Err(Error::ResponseTimeout));
        assert_eq!(client.state(), CommandState::Idle);
    }

    #[test]
    fn undecodable_line_keeps_the_command_in_flight() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        client.serial.rx.extend([0xff, 0xfe, 13]);
        assert_eq!(client.poll(at(10)), Err(Error::MalformedResponse));
        assert_eq!(client.state(), CommandState::SetParam);

        // the real answer still completes it
        client.serial.answer("I/OK");
        client.poll(at(20)).unwrap();
        assert_eq!(client.state(), CommandState::Idle);
    }

    #[test]
    fn flush_pending_clears_the_ring_and_forces_idle() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        client.send("B", at(0)).unwrap();
        client.send("C", at(0)).unwrap();

        client.flush_pending();
        assert_eq!(client.state(), CommandState::Idle);
        assert_eq!(client.pending(), 0);

        // the late reply to A is unsolicited now
        client.serial.take_tx();
        client.serial.answer("I/OK");
        assert_eq!(client.poll(at(10)), Ok(()));
        assert!(client.serial.tx.is_empty());
    }

    #[test]
    fn registry_messages_dispatch() {
        let mut client = client();
        client
            .handle_message(
                Message::SetParameter {
                    name: "WLCH",
                    value: "9",
                },
                at(0),
            )
            .unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iWLCH=\"9\"\r");

        client.serial.answer("I/OK");
        client.poll(at(1)).unwrap();

        client.handle_message(Message::Command("DOWN"), at(2)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iDOWN\r");
    }

    #[test]
    fn typed_parameter_values_format_as_decimal_text() {
        let mut client = client();
        client.set_parameter("FOO", 42i16, at(0)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iFOO=\"42\"\r");

        client.serial.answer("I/OK");
        client.poll(at(1)).unwrap();

        client.set_parameter("AMPS", (12.5f32, 1), at(2)).unwrap();
        assert_eq!(client.serial.take_tx(), "AT+iAMPS=\"12.5\"\r");
    }

    #[test]
    fn setup_resets_mid_conversation_state() {
        let mut client = client();
        client.send("A", at(0)).unwrap();
        client.send("B", at(0)).unwrap();
        client.serial.rx.extend(*b"partial line");

        client.setup();
        assert_eq!(client.state(), CommandState::Idle);
        assert_eq!(client.pending(), 0);
        assert_eq!(client.listener(), None);
    }
}
