//! Host-side driver shim (C6): a thin adapter over the vendor FTDI D2XX
//! library. This module knows nothing about SWD or MPSSE framing; it only
//! exposes the handful of vendor operations the transport layer needs.

use std::time::Duration;

use crate::error::{Error, Result};

/// MPSSE/bitbang mode selector, matching the FTDI `FT_SetBitMode` values.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BitMode {
    Reset = 0x00,
    AsyncBitbang = 0x01,
    Mpsse = 0x02,
}

/// Vendor device identification, as returned by `FT_GetDeviceInfo`.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub type_code: u32,
    pub description: String,
}

/// The set of operations this crate needs from a vendor USB library.
///
/// Production code implements this against `libftd2xx::Ftdi`; tests
/// implement it against an in-memory fake that replays scripted bytes,
/// which is how the whole stack above this trait gets exercised without
/// real hardware.
pub trait VendorDevice {
    fn reset(&mut self) -> Result<()>;
    fn purge(&mut self) -> Result<()>;
    fn set_usb_parameters(&mut self, buffer_len: u32) -> Result<()>;
    /// Disable the FTDI event/error characters (`FT_SetChars(0,0,0,0)`).
    fn disable_event_chars(&mut self) -> Result<()>;
    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()>;
    fn set_latency_timer(&mut self, latency: Duration) -> Result<()>;
    fn set_bit_mode(&mut self, pin_mask: u8, mode: BitMode) -> Result<()>;
    fn write(&mut self, data: &[u8]) -> Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn device_info(&mut self) -> Result<DeviceInfo>;
}

/// Concrete vendor device backed by FTDI's D2XX driver.
pub struct Ftd2xxDevice {
    inner: libftd2xx::Ftdi,
}

impl Ftd2xxDevice {
    /// Open the first available FTDI device.
    pub fn open() -> Result<Self> {
        let inner = libftd2xx::Ftdi::new().map_err(|e| Error::Vendor(e.to_string()))?;
        let mut dev = Ftd2xxDevice { inner };
        dev.reset()?;
        dev.purge()?;
        Ok(dev)
    }

    /// Open the FTDI device with the given serial number.
    pub fn open_with_serial(serial: &str) -> Result<Self> {
        let inner = libftd2xx::Ftdi::with_serial_number(serial)
            .map_err(|e| Error::Vendor(e.to_string()))?;
        let mut dev = Ftd2xxDevice { inner };
        dev.reset()?;
        dev.purge()?;
        Ok(dev)
    }
}

impl VendorDevice for Ftd2xxDevice {
    fn reset(&mut self) -> Result<()> {
        use libftd2xx::FtdiCommon;
        self.inner.reset().map_err(|e| Error::Vendor(e.to_string()))
    }

    fn purge(&mut self) -> Result<()> {
        use libftd2xx::FtdiCommon;
        self.inner
            .purge_all()
            .map_err(|e| Error::Vendor(e.to_string()))
    }

    fn set_usb_parameters(&mut self, buffer_len: u32) -> Result<()> {
        use libftd2xx::FtdiCommon;
        self.inner
            .set_usb_parameters(buffer_len)
            .map_err(|e| Error::Vendor(e.to_string()))
    }

    fn disable_event_chars(&mut self) -> Result<()> {
        use libftd2xx::FtdiCommon;
        // The D2XX event/error characters default to disabled; the closest
        // safe-wrapper equivalent of FT_SetChars(0,0,0,0) is to make sure
        // flow control stays off so no byte is ever treated as special.
        self.inner
            .set_flow_control_none()
            .map_err(|e| Error::Vendor(e.to_string()))
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        use libftd2xx::FtdiCommon;
        self.inner
            .set_timeouts(read, write)
            .map_err(|e| Error::Vendor(e.to_string()))
    }

    fn set_latency_timer(&mut self, latency: Duration) -> Result<()> {
        use libftd2xx::FtdiCommon;
        self.inner
            .set_latency_timer(latency)
            .map_err(|e| Error::Vendor(e.to_string()))
    }

    fn set_bit_mode(&mut self, pin_mask: u8, mode: BitMode) -> Result<()> {
        use libftd2xx::FtdiCommon;
        let vendor_mode = match mode {
            BitMode::Reset => libftd2xx::BitMode::Reset,
            BitMode::AsyncBitbang => libftd2xx::BitMode::AsyncBitbang,
            BitMode::Mpsse => libftd2xx::BitMode::Mpsse,
        };
        self.inner
            .set_bit_mode(pin_mask, vendor_mode)
            .map_err(|e| Error::Vendor(e.to_string()))
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        use std::io::Write;
        Ok(self.inner.write(data)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        use std::io::Read;
        Ok(self.inner.read(buf)?)
    }

    fn device_info(&mut self) -> Result<DeviceInfo> {
        use libftd2xx::FtdiCommon;
        let info = self
            .inner
            .device_info()
            .map_err(|e| Error::Vendor(e.to_string()))?;
        Ok(DeviceInfo {
            type_code: info.device_type as u32,
            description: info.description,
        })
    }
}
