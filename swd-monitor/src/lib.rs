//! Passive ARM SWD memory poller, layered on the `mpsse-bsp` transport.
//!
//! The layers mirror the wire from the bottom up: [`bitfield`] frames a
//! single transaction's bits, [`swd`] drives one transaction over an MPSSE
//! transport, [`dpap`] turns that into DP/AP register semantics, and
//! [`poll`] drives a pipelined read loop over a fixed set of addresses.

pub mod bitfield;
pub mod cli;
pub mod dpap;
pub mod error;
pub mod poll;
pub mod swd;

pub use bitfield::Frame;
pub use dpap::{ApRegister, ApSize, DpAp, DpRegister};
pub use error::{Result, SwdError};
pub use poll::{PollEngine, PollVar};
pub use swd::SwdLink;
