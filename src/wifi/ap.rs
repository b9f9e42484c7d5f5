//! Factory provisioning of the module as the vehicle's own access point.
//!
//! A factory-fresh module knows nothing about the vehicle. The sequence below
//! wipes it, switches the host interface to plain RS-232, and brings it back
//! up as an open access point with the embedded web configurator enabled.
//! The module needs settle time after each administrative command (a full
//! reboot after `DOWN`), so the sequence is walked one step per due tick
//! instead of being queued wholesale.

use embassy_time::{Duration, Instant};

use crate::client::IchipClient;
use crate::command::{CommandState, PendingCommand};
use crate::config::{ParameterStore, Transport};
use crate::error::Error;

/// Command bodies and the settle time the module needs after each one.
const SETUP_STEPS: &[(&str, Duration)] = &[
    ("FD", Duration::from_millis(2000)),     // wipe to factory defaults
    ("HIF=1", Duration::from_millis(1000)),  // host interface: RS-232
    ("BDRA", Duration::from_millis(1000)),   // automatic baud rate
    ("WLCH=9", Duration::from_millis(1000)),
    ("WLSI=!GEVCU", Duration::from_millis(1000)), // leading '!' marks the AP SSID
    ("DIP=192.168.3.10", Duration::from_millis(1000)),
    ("DPSZ=8", Duration::from_millis(1000)), // DHCP pool size
    ("RPG=secret", Duration::from_millis(1000)), // web configurator password
    ("WPWD=secret", Duration::from_millis(1000)),
    ("AWS=1", Duration::from_millis(1000)),  // embedded web server on
    ("DOWN", Duration::from_millis(5000)),   // apply everything, module reboots
];

/// Cursor over [`SETUP_STEPS`].
#[derive(Debug)]
pub(crate) struct Provisioner {
    step: usize,
    ready_at: Instant,
}

impl Provisioner {
    fn new(now: Instant) -> Self {
        Self { step: 0, ready_at: now }
    }
}

impl<T: Transport, P: ParameterStore> IchipClient<T, P> {
    /// Reset the module to factory defaults and bring it back up as the
    /// vehicle's access point. The sequence runs over the following ticks,
    /// roughly sixteen seconds end to end, and finishes with a full
    /// parameter push (the wipe discarded everything the model had loaded).
    pub fn provision_access_point(&mut self, now: Instant) {
        info!("provisioning module as access point");
        self.flush_pending();
        self.provisioner = Some(Provisioner::new(now));
    }

    /// List nearby access points. The module prints the report on its own
    /// console channel.
    pub fn scan_access_points(&mut self, now: Instant) -> Result<(), Error> {
        self.send("RP20", now)
    }

    /// Put the module into WPS pairing mode.
    pub fn start_wps(&mut self, now: Instant) -> Result<(), Error> {
        self.send("AWPS", now)
    }

    /// Emit the next provisioning step once its predecessor's settle time has
    /// elapsed. Returns true when a command went out.
    pub(crate) fn step_provisioner(&mut self, now: Instant) -> bool {
        let Some(provisioner) = self.provisioner.as_ref() else {
            return false;
        };
        if now < provisioner.ready_at {
            return false;
        }
        let step = provisioner.step;

        let Some(&(body, settle)) = SETUP_STEPS.get(step) else {
            // sequence done; put the configuration model back on the module
            self.provisioner = None;
            self.load_parameters(now);
            return true;
        };

        // the module may be mid-reboot, so no reply is expected at any step
        let cmd = unwrap!(PendingCommand::new(body, CommandState::Idle));
        if let Err(e) = self.transmit(cmd, now) {
            // ready_at is unchanged, the step retries on the next tick
            warn!("provisioning step {} not sent: {:?}", step, e);
            return false;
        }
        if let Some(provisioner) = self.provisioner.as_mut() {
            provisioner.step = step + 1;
            provisioner.ready_at = now + settle;
        }
        true
    }
}
