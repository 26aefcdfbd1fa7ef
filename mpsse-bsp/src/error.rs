use std::time::Duration;

/// Failures surfaced by the vendor device shim and the MPSSE transport.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("USB read returned {got} bytes, expected {want}")]
    ReadTimeout { want: usize, got: usize },

    #[error("vendor device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vendor device error: {0}")]
    Vendor(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// 1s USB read/write timeout, per the startup sequence below.
pub const USB_TIMEOUT: Duration = Duration::from_secs(1);
/// 2ms FTDI latency timer.
pub const USB_LATENCY: Duration = Duration::from_millis(2);
/// FTDI USB buffer length in bytes.
pub const USB_BUFFER_LEN: u32 = 1024;
