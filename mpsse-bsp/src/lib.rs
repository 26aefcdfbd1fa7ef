//! MPSSE transport and vendor device shim for the SWD monitor.
//!
//! This crate is the host analogue of a board support package: it knows
//! about USB buffering, clock divisors and GPIO pin direction, but nothing
//! about the SWD wire protocol layered on top of it.

pub mod device;
pub mod error;
pub mod transport;

pub use device::{BitMode, DeviceInfo, Ftd2xxDevice, VendorDevice};
pub use error::{Error, Result};
pub use transport::MpsseTransport;

/// A scripted `VendorDevice` fake, exported so downstream crates can drive
/// the whole transport/protocol stack in tests without real hardware.
pub mod fake;
