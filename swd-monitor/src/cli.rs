//! Command-line surface: device selection, poll variables, and timing
//! knobs that are more useful to a user as overridable defaults than as
//! process-wide constants.

use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::poll::POLL_DELAY;

/// Default SWD clock, the default SWD bus speed.
pub const DEFAULT_CLOCK_HZ: u32 = 1_000_000;

#[derive(Debug, Clone)]
pub struct PollVarArg {
    pub name: String,
    pub addr: u32,
}

impl FromStr for PollVarArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, addr) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=0xADDRESS, got {s:?}"))?;
        let addr = addr.trim();
        let addr = addr.strip_prefix("0x").or_else(|| addr.strip_prefix("0X"));
        let addr = addr.ok_or_else(|| format!("address must be 0x-prefixed hex, got {s:?}"))?;
        let addr = u32::from_str_radix(addr, 16).map_err(|e| format!("{s:?}: {e}"))?;
        Ok(PollVarArg {
            name: name.to_string(),
            addr,
        })
    }
}

/// Passively watch a set of target memory addresses over SWD and print
/// each change as it's observed.
#[derive(Debug, Parser)]
#[clap(about = "passively poll ARM SWD target memory over an FTDI MPSSE probe")]
pub struct Args {
    /// Serial number of the FTDI device to open, if more than one is
    /// attached.
    #[clap(short, long)]
    pub serial: Option<String>,

    /// SPI/SWD clock rate, in Hz.
    #[clap(long, default_value_t = DEFAULT_CLOCK_HZ)]
    pub clock_hz: u32,

    /// Delay between poll cycles, in milliseconds.
    #[clap(long, default_value_t = POLL_DELAY.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// Increase log verbosity; repeatable (-v, -vv, -vvv).
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Variables to poll, as NAME=0xADDRESS (e.g. `STATUS=0x40010C08`).
    #[clap(required = true)]
    pub vars: Vec<PollVarArg>,
}

impl Args {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Log filter level implied by the verbosity count, used to seed
    /// `env_logger` when `RUST_LOG` isn't set.
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_var_arg_parses_hex_address() {
        let v: PollVarArg = "STATUS=0x40010C08".parse().unwrap();
        assert_eq!(v.name, "STATUS");
        assert_eq!(v.addr, 0x4001_0C08);
    }

    #[test]
    fn poll_var_arg_rejects_missing_prefix() {
        assert!("STATUS=40010C08".parse::<PollVarArg>().is_err());
    }

    #[test]
    fn poll_var_arg_rejects_missing_equals() {
        assert!("STATUS".parse::<PollVarArg>().is_err());
    }
}
