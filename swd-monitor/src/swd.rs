//! SWD link (C3): one read/write transaction, split into *tx* and *rx*
//! halves so the poll engine can pipeline many of them behind a single
//! USB flush. Adapted from the firmware SWD driver this crate is built
//! from, generalised from a dedicated SPI peripheral onto the MPSSE
//! byte/bit command stream.

use mpsse_bsp::device::VendorDevice;
use mpsse_bsp::transport::{MpsseTransport, WR_BITS, WR_BYTES};

use crate::bitfield::Frame;
use crate::error::{Result, SwdError};

pub const ACK_OK: u8 = 0b001;
pub const ACK_WAIT: u8 = 0b010;
pub const ACK_FAULT: u8 = 0b100;

/// The SWD line state machine. A FAULT ack moves the link into `Error`,
/// which only a DP ABORT write (performed by the caller, not here) can
/// clear; this layer never auto-clears it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineState {
    Unknown,
    Reset,
    Idle,
    Transaction,
    Error,
}

fn decode_ack(ack: u8) -> Result<()> {
    match ack {
        ACK_OK => Ok(()),
        ACK_WAIT => {
            log::debug!("SWD ack: WAIT");
            Err(SwdError::AckWait)
        }
        ACK_FAULT => {
            log::warn!("SWD ack: FAULT");
            Err(SwdError::AckFault)
        }
        other => {
            log::warn!("SWD ack: unrecognised {other:#05b}");
            Err(SwdError::AckProtocol(other))
        }
    }
}

/// A single SWD link over an MPSSE transport.
pub struct SwdLink<D: VendorDevice> {
    transport: MpsseTransport<D>,
    state: LineState,
}

impl<D: VendorDevice> SwdLink<D> {
    pub fn new(transport: MpsseTransport<D>) -> Self {
        SwdLink {
            transport,
            state: LineState::Unknown,
        }
    }

    pub fn state(&self) -> LineState {
        self.state
    }

    pub fn into_transport(self) -> MpsseTransport<D> {
        self.transport
    }

    /// >=50 clocks of 1, the JTAG-to-SWD switch sequence, >=50 more clocks
    /// of 1, then >=2 zero bits. Leaves the line in Reset, then Idle.
    pub fn swd_reset(&mut self) -> mpsse_bsp::Result<()> {
        const HIGH: [u8; 7] = [0xFF; 7];
        self.transport.write_bytes(WR_BYTES, &HIGH);
        self.transport.write_bytes(WR_BYTES, &[0x9E, 0xE7]);
        self.transport.write_bytes(WR_BYTES, &HIGH);
        self.transport.write_bits(WR_BITS, 0x00, 2);
        self.transport.flush()?;
        self.state = LineState::Idle;
        Ok(())
    }

    /// Clock out `n` idle (zero) bytes, required between bus-turnaround
    /// points to satisfy the target.
    pub fn swd_idle_bytes(&mut self, n: usize) {
        let zeros = vec![0u8; n];
        self.transport.write_bytes(WR_BYTES, &zeros);
    }

    /// Queue the request bits for an SWD read transaction without
    /// flushing or consuming any response. Pair with [`recv`](Self::recv)
    /// on the returned frame once the matching flush has happened.
    pub fn queue_rd(&mut self, apndp: bool, addr: u32) -> Frame {
        self.state = LineState::Transaction;
        let frame = Frame::read_request(apndp, addr);
        frame.pack(&mut self.transport);
        frame
    }

    /// As [`queue_rd`](Self::queue_rd), for a write transaction.
    pub fn queue_wr(&mut self, apndp: bool, addr: u32, value: u32) -> Frame {
        self.state = LineState::Transaction;
        let frame = Frame::write_request(apndp, addr, value);
        frame.pack(&mut self.transport);
        frame
    }

    /// Flush if needed, then consume the response bits of a previously
    /// queued `frame`, in the order they were queued. Legal to call after
    /// any number of other frames were queued (but not yet received) in
    /// between, as long as `recv` calls happen in the same order as the
    /// matching `queue_*` calls.
    pub fn recv(&mut self, frame: &mut Frame) -> Result<()> {
        self.transport.flush().map_err(|_| SwdError::ReadTimeout)?;
        frame.unpack(&mut self.transport)?;
        let outcome = decode_ack(frame.ack()).and_then(|()| {
            match frame.received_dparity() {
                Some(received) if crate::bitfield::parity32(frame.data()) != received => {
                    Err(SwdError::Parity)
                }
                _ => Ok(()),
            }
        });
        self.state = if outcome == Err(SwdError::AckFault) {
            LineState::Error
        } else {
            LineState::Idle
        };
        outcome
    }

    /// Combined tx+rx read transaction: queue, flush, and receive in one
    /// call. Equivalent to `queue_rd` followed by `recv` on the same
    /// frame, given an unchanged target.
    pub fn swd_rd(&mut self, apndp: bool, addr: u32) -> Result<Frame> {
        let mut frame = self.queue_rd(apndp, addr);
        self.recv(&mut frame)?;
        Ok(frame)
    }

    /// As [`swd_rd`](Self::swd_rd), for a write transaction.
    pub fn swd_wr(&mut self, apndp: bool, addr: u32, value: u32) -> Result<Frame> {
        let mut frame = self.queue_wr(apndp, addr, value);
        self.recv(&mut frame)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpsse_bsp::fake::FakeDevice;
    use mpsse_bsp::transport::MpsseTransport;

    fn ack_chunk(ack: u8) -> Vec<u8> {
        vec![ack << 5]
    }

    fn read_chunks(ack: u8, value: u32) -> Vec<Vec<u8>> {
        let mut chunks = vec![ack_chunk(ack)];
        chunks.extend(value.to_le_bytes().iter().map(|b| vec![*b]));
        chunks.push(vec![((value.count_ones() & 1) as u8) << 7]);
        chunks
    }

    fn link_with_reads(reads: Vec<Vec<u8>>) -> SwdLink<FakeDevice> {
        let fake = FakeDevice::with_scripted_reads(reads);
        SwdLink::new(MpsseTransport::new(fake))
    }

    #[test]
    fn swd_reset_emits_the_line_reset_sequence() {
        let mut link = link_with_reads(vec![]);
        link.swd_reset().unwrap();
        let written = link.into_transport().into_device().written_bytes();

        let mut expected = vec![WR_BYTES, 6, 0];
        expected.extend([0xFF; 7]);
        expected.extend([WR_BYTES, 1, 0, 0x9E, 0xE7]);
        expected.extend([WR_BYTES, 6, 0]);
        expected.extend([0xFF; 7]);
        expected.extend([WR_BITS, 1, 0x00]);

        assert_eq!(written, expected);
    }

    #[test]
    fn swd_reset_leaves_the_line_idle() {
        let mut link = link_with_reads(vec![]);
        link.swd_reset().unwrap();
        assert_eq!(link.state(), LineState::Idle);
    }

    #[test]
    fn split_tx_rx_matches_combined_read() {
        let reads = read_chunks(ACK_OK, 0xCAFE_F00D);
        let mut combined = link_with_reads(reads.clone());
        let via_combined = combined.swd_rd(true, 0xC).unwrap();

        let mut split = link_with_reads(reads);
        let mut frame = split.queue_rd(true, 0xC);
        split.recv(&mut frame).unwrap();

        assert_eq!(frame.ack(), via_combined.ack());
        assert_eq!(frame.data(), via_combined.data());
    }

    #[test]
    fn recv_reports_ack_wait() {
        let mut link = link_with_reads(read_chunks(ACK_WAIT, 0));
        let mut frame = link.queue_rd(true, 0x0);
        assert_eq!(link.recv(&mut frame).unwrap_err(), SwdError::AckWait);
    }

    #[test]
    fn recv_reports_ack_fault_and_moves_link_to_error_state() {
        let mut link = link_with_reads(read_chunks(ACK_FAULT, 0));
        let mut frame = link.queue_rd(true, 0x0);
        assert_eq!(link.recv(&mut frame).unwrap_err(), SwdError::AckFault);
        assert_eq!(link.state(), LineState::Error);
    }

    #[test]
    fn recv_reports_unrecognized_ack_as_protocol_error() {
        let mut link = link_with_reads(read_chunks(0b111, 0));
        let mut frame = link.queue_rd(true, 0x0);
        assert_eq!(
            link.recv(&mut frame).unwrap_err(),
            SwdError::AckProtocol(0b111)
        );
    }

    /// Reconstructs the byte clocked out by the first `ncommands` MPSSE
    /// bit-mode commands (`[cmd, nbits-1, byte]` each) in `written`,
    /// LSB-first, the way the wire would actually see them.
    fn header_byte(written: &[u8], ncommands: usize) -> u8 {
        let mut acc: u16 = 0;
        let mut shift = 0u32;
        for chunk in written.chunks(3).take(ncommands) {
            let nbits = chunk[1] + 1;
            let value = chunk[2] & ((1u16 << nbits) - 1) as u8;
            acc |= (value as u16) << shift;
            shift += nbits as u32;
        }
        acc as u8
    }

    #[test]
    fn reset_then_idcode_read_header_is_0xa5() {
        let mut link = link_with_reads(read_chunks(ACK_OK, 0));
        link.swd_reset().unwrap();
        let _ = link.swd_rd(false, 0x0);

        let written = link.into_transport().into_device().written_bytes();
        // swd_reset's own flush lands first: three byte-mode WR_BYTES
        // commands (cmd + 2-byte length + payload: 10, 5, 10 bytes) and
        // one 3-byte WR_BITS command for the trailing zero bits.
        let reset_bytes = 10 + 5 + 10 + 3;
        // The header is Start, APnDP, RnW, Addr, HParity, Stop, Park, Trn:
        // 8 one/two-bit fields, each its own 3-byte bit-mode command.
        let header = header_byte(&written[reset_bytes..], 8);
        assert_eq!(header, 0xA5);
    }

    #[test]
    fn recv_rejects_mismatched_dparity() {
        let mut chunks = read_chunks(ACK_OK, 0x0000_0001);
        let last = chunks.last_mut().unwrap();
        last[0] ^= 0x80; // flip the received DParity bit
        let mut link = link_with_reads(chunks);
        let mut frame = link.queue_rd(true, 0x0);
        assert_eq!(link.recv(&mut frame).unwrap_err(), SwdError::Parity);
    }
}
