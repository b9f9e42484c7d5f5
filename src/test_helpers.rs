//! Test doubles shared by the unit tests: an in-memory serial port and a
//! canned configuration model.

use core::convert::Infallible;

use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use embassy_time::Instant;

use crate::command::ParamValue;
use crate::config::ParameterStore;

/// Fabricate a point in time, in milliseconds.
pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// In-memory serial port: tests script what the module answers through `rx`
/// and inspect what the driver wrote through `tx`.
#[derive(Debug, Default)]
pub struct MockSerial {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a module answer, CRLF terminated like the real firmware.
    pub fn answer(&mut self, line: &str) {
        self.rx.extend(line.as_bytes());
        self.rx.push_back(13);
        self.rx.push_back(10);
    }

    /// Everything written since the last take, as text.
    pub fn take_tx(&mut self) -> String {
        String::from_utf8(core::mem::take(&mut self.tx)).unwrap()
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = Infallible;
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let count = buf.len().min(self.rx.len());
        for byte in buf.iter_mut().take(count) {
            *byte = self.rx.pop_front().unwrap();
        }
        Ok(count)
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Configuration model double: records what the driver forwards and serves a
/// canned set of parameters for pushes.
#[derive(Debug, Default)]
pub struct MockParams {
    pub received: Vec<(String, String)>,
    pub exported: Vec<(String, String)>,
}

impl ParameterStore for MockParams {
    fn param_changed(&mut self, name: &str, value: &str) {
        self.received.push((name.to_string(), value.to_string()));
    }

    fn for_each_param(&self, f: &mut dyn FnMut(&str, ParamValue<'_>)) {
        for (name, value) in &self.exported {
            f(name, ParamValue::Text(value));
        }
    }
}
