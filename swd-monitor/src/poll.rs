//! Poll engine (C5): drives pipelined send/receive passes over a list of
//! target addresses, diffs observed values against what was last reported,
//! and emits ASCII change notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mpsse_bsp::device::VendorDevice;

use crate::bitfield::Frame;
use crate::dpap::ApRegister;
use crate::swd::{SwdLink, ACK_OK};

/// Default inter-cycle delay, matching the default used at startup.
pub const POLL_DELAY: Duration = Duration::from_millis(10);

const AP: bool = true;

/// A 3-state observation: a PollVar starts life in `Initial` (never polled
/// yet), distinct from `Unknown` (polled, but the cycle's read failed).
/// This lets the very first failed read still be reported as a change
/// ("name=?"), while subsequent consecutive failures are not re-reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Observed {
    Initial,
    Unknown,
    Known(u32),
}

impl Observed {
    fn notification(self, name: &str) -> String {
        match self {
            Observed::Known(v) => format!("{name}={v:X}"),
            _ => format!("{name}=?"),
        }
    }
}

/// A named target address tracked across polling cycles.
pub struct PollVar {
    name: String,
    addr: u32,
    last_reported: Observed,
}

impl PollVar {
    pub fn new(name: impl Into<String>, addr: u32) -> Self {
        PollVar {
            name: name.into(),
            addr,
            last_reported: Observed::Initial,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }
}

/// Drives the pipelined poll loop over a fixed list of [`PollVar`]s.
pub struct PollEngine<D: VendorDevice> {
    link: SwdLink<D>,
    vars: Vec<PollVar>,
    notify: Sender<String>,
    stop: Arc<AtomicBool>,
    delay: Duration,
}

impl<D: VendorDevice> PollEngine<D> {
    pub fn new(link: SwdLink<D>, vars: Vec<PollVar>, notify: Sender<String>) -> Self {
        PollEngine {
            link,
            vars,
            notify,
            stop: Arc::new(AtomicBool::new(false)),
            delay: POLL_DELAY,
        }
    }

    /// Override the inter-cycle delay, e.g. from a user-supplied setting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// A clone-able handle the UI thread can flip to ask the engine to
    /// finish its current cycle and exit.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run cycles until the stop handle is set, sleeping the configured
    /// delay between them.
    pub fn run(&mut self) {
        log::info!("poll loop starting, {} variable(s)", self.vars.len());
        while !self.stop.load(Ordering::Relaxed) {
            self.run_cycle();
            thread::sleep(self.delay);
        }
        log::info!("poll loop stopped");
    }

    /// Run exactly one send+receive cycle and emit any resulting change
    /// notifications, in PollVar order. Exposed separately from `run` so
    /// tests can drive individual cycles deterministically.
    pub fn run_cycle(&mut self) {
        log::trace!("poll cycle starting");
        let values = self.send_and_receive();
        log::trace!("poll cycle finished");
        for (var, value) in self.vars.iter_mut().zip(values) {
            if value != var.last_reported {
                let _ = self.notify.send(value.notification(&var.name));
                var.last_reported = value;
            }
        }
    }

    fn send_and_receive(&mut self) -> Vec<Observed> {
        // Send pass: queue TAR write + 2 idle bytes + two DRW reads per
        // variable, then flush exactly once for the whole pass. Every
        // queued frame's sampled fields (the TAR write's Ack included)
        // occupy real bytes in the RX pipe, so each one queued here must
        // be received, in the same order, below - or the next frame's
        // `unpack` would pick up the wrong bytes.
        for var in &self.vars {
            self.link.queue_wr(AP, ApRegister::Tar as u32, var.addr);
            self.link.swd_idle_bytes(2);
            self.link.queue_rd(AP, ApRegister::Drw as u32);
            self.link.queue_rd(AP, ApRegister::Drw as u32);
        }

        // Receive pass: reconstruct frames of identical shape to the ones
        // queued above (a pure function of apndp/addr/value, so no need
        // to have kept the originals) and consume them in the same
        // order. The first DRW response absorbs the previous cycle's
        // posted value; only the second is the one we report.
        let mut values = Vec::with_capacity(self.vars.len());
        for var in &self.vars {
            let mut tar = Frame::write_request(AP, ApRegister::Tar as u32, var.addr);
            let _ = self.link.recv(&mut tar);

            let mut stale = Frame::read_request(AP, ApRegister::Drw as u32);
            let _ = self.link.recv(&mut stale);

            let mut fresh = Frame::read_request(AP, ApRegister::Drw as u32);
            let result = self.link.recv(&mut fresh);
            let observed = match result {
                Ok(()) if fresh.ack() == ACK_OK => Observed::Known(fresh.data()),
                _ => Observed::Unknown,
            };
            values.push(observed);
        }
        values
    }
}
