//! MPSSE transport (C1): byte/bit SPI-like write+read commands over the
//! buffered USB pipe exposed by [`crate::device::VendorDevice`].
//!
//! All `write_*` calls only append to an in-memory TX buffer; nothing is
//! written to the device until [`MpsseTransport::flush`] is called. SWD
//! cycles are built from many small commands and the per-command USB
//! latency would otherwise dominate.

use crate::device::{BitMode, VendorDevice};
use crate::error::{Result, USB_BUFFER_LEN, USB_LATENCY, USB_TIMEOUT};

/// MPSSE command bit flags (LSB-first semantics, mandatory for SWD).
pub const WRITE_NEG_EDGE: u8 = 0x01;
pub const BIT_MODE: u8 = 0x02;
pub const READ_NEG_EDGE: u8 = 0x04;
pub const LSB_FIRST: u8 = 0x08;
pub const WRITE_TDI: u8 = 0x10;
pub const READ_TDO: u8 = 0x20;
pub const WRITE_TMS: u8 = 0x40;

/// Clock out and sample on the edges SWD requires: write on the falling
/// edge, read on the rising edge, LSB first.
pub const WR_BYTES: u8 = WRITE_TDI | WRITE_NEG_EDGE | LSB_FIRST;
pub const RD_BYTES: u8 = READ_TDO | LSB_FIRST;
pub const RD_WR_BYTES: u8 = RD_BYTES | WR_BYTES;
pub const WR_BITS: u8 = WR_BYTES | BIT_MODE;
pub const RD_BITS: u8 = RD_BYTES | BIT_MODE;
pub const RD_WR_BITS: u8 = RD_BITS | WR_BITS;

const MPSSE_REFERENCE_CLOCK_HZ: u32 = 12_000_000;
/// SPI clock and MOSI are AD0/AD1 of the low byte and must be driven as outputs.
const SPI_OUTPUT_PINS: u8 = 0x03;

const SET_CLOCK_DIVISOR: u8 = 0x86;
const SET_LOW_BYTE: u8 = 0x80;
const SET_HIGH_BYTE: u8 = 0x82;
const GET_LOW_BYTE: u8 = 0x81;
const GET_HIGH_BYTE: u8 = 0x83;
const BAD_COMMAND_PROBE: u8 = 0xAA;
const BAD_COMMAND_ECHO: [u8; 2] = [0xFA, 0xAA];

/// Buffered MPSSE command layer on top of a vendor USB device.
pub struct MpsseTransport<D: VendorDevice> {
    device: D,
    tx_buf: Vec<u8>,
}

impl<D: VendorDevice> MpsseTransport<D> {
    pub fn new(device: D) -> Self {
        MpsseTransport {
            device,
            tx_buf: Vec::with_capacity(USB_BUFFER_LEN as usize),
        }
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Program the MPSSE engine for an SWD-shaped SPI transfer at `clock_hz`.
    pub fn spi_init(&mut self, clock_hz: u32) -> Result<()> {
        let divisor = (MPSSE_REFERENCE_CLOCK_HZ / (2 * clock_hz)).saturating_sub(1);

        self.device.set_usb_parameters(USB_BUFFER_LEN)?;
        self.device.disable_event_chars()?;
        self.device.set_timeouts(USB_TIMEOUT, USB_TIMEOUT)?;
        self.device.set_latency_timer(USB_LATENCY)?;
        self.device.set_bit_mode(0, BitMode::Reset)?;
        self.device.set_bit_mode(0, BitMode::Mpsse)?;

        self.write_cmd_word(SET_CLOCK_DIVISOR, divisor as u16);
        self.set_port(false, SPI_OUTPUT_PINS, 0x00);
        self.flush()
    }

    /// Sanity-check that the FTDI RX pipe is in sync with what we sent, by
    /// issuing the illegal opcode 0xAA and checking for its "bad command"
    /// echo `[0xFA, 0xAA]`.
    pub fn check_sync(&mut self) -> Result<bool> {
        self.tx_buf.push(BAD_COMMAND_PROBE);
        self.flush()?;
        let data = self.read_raw(2)?;
        let synced = data == BAD_COMMAND_ECHO;
        log::debug!("MPSSE sync check: {}", if synced { "ok" } else { "failed" });
        Ok(synced)
    }

    /// Queue an MPSSE clock-data command carrying `data.len()` whole bytes.
    pub fn write_bytes(&mut self, cmd: u8, data: &[u8]) {
        let n = (data.len() - 1) as u16;
        self.tx_buf.push(cmd);
        self.tx_buf.extend_from_slice(&n.to_le_bytes());
        self.tx_buf.extend_from_slice(data);
    }

    /// Queue an MPSSE clock-data command carrying 1..=8 bits of `byte`.
    pub fn write_bits(&mut self, cmd: u8, byte: u8, nbits: u8) {
        debug_assert!((1..=8).contains(&nbits));
        self.tx_buf.push(cmd);
        self.tx_buf.push(nbits - 1);
        self.tx_buf.push(byte);
    }

    fn write_cmd_word(&mut self, cmd: u8, word: u16) {
        self.tx_buf.push(cmd);
        self.tx_buf.extend_from_slice(&word.to_le_bytes());
    }

    /// Request `nbytes` of whole-byte read data. Must be preceded by a
    /// matching queued read command and a [`flush`](Self::flush).
    pub fn read_bytes(&mut self, nbytes: usize) -> Result<Vec<u8>> {
        self.read_raw(nbytes)
    }

    /// Request a sub-byte read. Bits come back left-justified in the
    /// returned byte and are shifted right by `8 - nbits` here.
    pub fn read_bits(&mut self, nbits: u8) -> Result<Option<u8>> {
        let data = self.read_raw(1)?;
        Ok(data.first().map(|b| b >> (8 - nbits)))
    }

    fn read_raw(&mut self, nbytes: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; nbytes];
        let got = self.device.read(&mut buf)?;
        buf.truncate(got);
        if got < nbytes {
            log::warn!("USB read returned {got}/{nbytes} bytes");
        }
        Ok(buf)
    }

    /// Drain the accumulated TX buffer in a single USB write. The buffer
    /// always holds a whole number of MPSSE commands, so partial flushes
    /// never happen.
    pub fn flush(&mut self) -> Result<()> {
        if self.tx_buf.is_empty() {
            return Ok(());
        }
        self.device.write(&self.tx_buf)?;
        self.tx_buf.clear();
        Ok(())
    }

    /// Set GPIO port pins (low byte if `!hi`, high byte if `hi`).
    pub fn set_port(&mut self, hi: bool, direction_mask: u8, value: u8) {
        let cmd = if hi { SET_HIGH_BYTE } else { SET_LOW_BYTE };
        self.tx_buf.push(cmd);
        self.tx_buf.push(value);
        self.tx_buf.push(direction_mask);
    }

    /// As [`set_port`](Self::set_port), but forces the SPI clock/MOSI bits
    /// of the low byte to remain outputs regardless of `direction_mask`.
    pub fn set_port_protected(&mut self, hi: bool, direction_mask: u8, value: u8) {
        let dirn = if hi {
            direction_mask
        } else {
            (direction_mask & 0xf8) | SPI_OUTPUT_PINS
        };
        self.set_port(hi, dirn, value);
    }

    /// Queue a request for the current port pin state.
    pub fn get_port(&mut self, hi: bool) {
        self.tx_buf.push(if hi { GET_HIGH_BYTE } else { GET_LOW_BYTE });
    }
}

/// Convenience constructor wiring a transport's `spi_init` to a fresh
/// device open, wiring reset, purge, and clock setup together in one call.
pub fn open_and_init<D: VendorDevice>(mut device: D, clock_hz: u32) -> Result<MpsseTransport<D>> {
    device.reset()?;
    device.purge()?;
    let mut transport = MpsseTransport::new(device);
    transport.spi_init(clock_hz)?;
    Ok(transport)
}
