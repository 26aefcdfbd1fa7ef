//! Bit-field codec (C2): packs and unpacks SWD request frames as ordered
//! sequences of variable-width, LSB-first bit fields.
//!
//! Iteration over the field sequence is the central idiom here: a frame is
//! a value-type sequence, and packing/unpacking are just two visitors over
//! it, not a class hierarchy.

use mpsse_bsp::device::VendorDevice;
use mpsse_bsp::transport::{MpsseTransport, RD_WR_BITS, WR_BITS};

use crate::error::{Result, SwdError};

/// A value of up to 32 bits transmitted or received as part of one SWD
/// transaction. `sampled` fields are read back from the wire; unsampled
/// fields are write-only (their value is fixed by the caller).
#[derive(Clone, Copy, Debug)]
pub struct BitField {
    pub value: u32,
    pub width: u8,
    pub label: &'static str,
    pub sampled: bool,
}

impl BitField {
    const fn new(value: u32, width: u8, label: &'static str) -> Self {
        BitField {
            value,
            width,
            label,
            sampled: false,
        }
    }

    const fn sampled(width: u8, label: &'static str) -> Self {
        BitField {
            value: 0,
            width,
            label,
            sampled: true,
        }
    }
}

/// An ordered sequence of [`BitField`]s that, concatenated LSB-first on the
/// wire, forms one SWD transaction. Indices of the named fields are fixed
/// per frame kind; [`Frame::read_request`]/[`Frame::write_request`] are the
/// only constructors, so the indices below always agree with them.
#[derive(Clone, Debug)]
pub struct Frame {
    fields: Vec<BitField>,
    ack_idx: usize,
    data_idx: usize,
    dparity_idx: Option<usize>,
}

impl Frame {
    /// Build a read-transaction frame: Start, APnDP, RnW=1, A[2:3],
    /// HParity, Stop=0, Park=1, Trn, Ack, Data, DParity, Trn.
    pub fn read_request(apndp: bool, addr: u32) -> Self {
        let a = (addr >> 2) & 0b11;
        let hparity = parity_bit(apndp as u32 ^ 1 ^ a);
        let fields = vec![
            BitField::new(1, 1, "Start"),
            BitField::new(apndp as u32, 1, "APnDP"),
            BitField::new(1, 1, "RnW"),
            BitField::new(a, 2, "Addr"),
            BitField::new(hparity, 1, "HParity"),
            BitField::new(0, 1, "Stop"),
            BitField::new(1, 1, "Park"),
            BitField::new(0, 1, "Trn"),
            BitField::sampled(3, "Ack"),
            BitField::sampled(32, "Data"),
            BitField::sampled(1, "DParity"),
            BitField::new(0, 1, "Trn"),
        ];
        Frame {
            fields,
            ack_idx: 8,
            data_idx: 9,
            dparity_idx: Some(10),
        }
    }

    /// Build a write-transaction frame: Start, APnDP, RnW=0, A[2:3],
    /// HParity, Stop=0, Park=1, Trn, Ack, Trn, Data, DParity.
    pub fn write_request(apndp: bool, addr: u32, value: u32) -> Self {
        let a = (addr >> 2) & 0b11;
        let hparity = parity_bit(apndp as u32 ^ a);
        let dparity = parity32(value);
        let fields = vec![
            BitField::new(1, 1, "Start"),
            BitField::new(apndp as u32, 1, "APnDP"),
            BitField::new(0, 1, "RnW"),
            BitField::new(a, 2, "Addr"),
            BitField::new(hparity, 1, "HParity"),
            BitField::new(0, 1, "Stop"),
            BitField::new(1, 1, "Park"),
            BitField::new(0, 1, "Trn"),
            BitField::sampled(3, "Ack"),
            BitField::new(0, 1, "Trn"),
            BitField::new(value, 32, "Data"),
            BitField::new(dparity, 1, "DParity"),
        ];
        Frame {
            fields,
            ack_idx: 8,
            data_idx: 10,
            dparity_idx: None,
        }
    }

    pub fn ack(&self) -> u8 {
        self.fields[self.ack_idx].value as u8
    }

    pub fn data(&self) -> u32 {
        self.fields[self.data_idx].value
    }

    pub fn received_dparity(&self) -> Option<u32> {
        self.dparity_idx.map(|i| self.fields[i].value)
    }

    /// Queue this frame's fields on the transport without flushing and
    /// without consuming any response bits (the "tx" half of a split
    /// transaction).
    pub fn pack<D: VendorDevice>(&self, transport: &mut MpsseTransport<D>) {
        for field in &self.fields {
            let mut value = field.value;
            let mut nbits = field.width;
            let cmd = if field.sampled { RD_WR_BITS } else { WR_BITS };
            while nbits > 0 {
                let n = nbits.min(8);
                transport.write_bits(cmd, (value & 0xff) as u8, n);
                value >>= n;
                nbits -= n;
            }
        }
    }

    /// Consume this frame's sampled fields from the transport's RX pipe,
    /// in the same order they were packed. The caller must have flushed
    /// already. Returns `Err` on the first short read.
    pub fn unpack<D: VendorDevice>(&mut self, transport: &mut MpsseTransport<D>) -> Result<()> {
        for field in self.fields.iter_mut().filter(|f| f.sampled) {
            let mut value: u32 = 0;
            let mut shift = 0u32;
            let mut nbits = field.width;
            while nbits >= 8 {
                let data = transport.read_bytes(1).map_err(|_| SwdError::ReadTimeout)?;
                let byte = *data.first().ok_or(SwdError::ReadTimeout)?;
                value |= (byte as u32) << shift;
                shift += 8;
                nbits -= 8;
            }
            if nbits > 0 {
                let bits = transport
                    .read_bits(nbits)
                    .map_err(|_| SwdError::ReadTimeout)?
                    .ok_or(SwdError::ReadTimeout)?;
                value |= (bits as u32) << shift;
            }
            field.value = value;
        }
        Ok(())
    }
}

fn parity_bit(bits: u32) -> u32 {
    bits.count_ones() & 1
}

/// Even parity of a 32-bit word, via the classic word-parallel popcount
/// fold. Must agree bit-exactly with a naive XOR across a fuzzed sample.
pub fn parity32(value: u32) -> u32 {
    let mut i = value;
    i -= (i >> 1) & 0x5555_5555;
    i = (i & 0x3333_3333) + ((i >> 2) & 0x3333_3333);
    i = ((i.wrapping_add(i >> 4)) & 0x0F0F_0F0F).wrapping_mul(0x0101_0101) >> 24;
    i & 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parity32_matches_naive_xor_fold() {
        fn naive(v: u32) -> u32 {
            (0..32).fold(0, |acc, i| acc ^ ((v >> i) & 1))
        }
        for v in [0u32, 1, 0xFFFF_FFFF, 0xABCD_1234, 0x8000_0000, 0x0000_0001] {
            assert_eq!(parity32(v), naive(v), "mismatch for {v:#010X}");
        }
    }

    proptest! {
        #[test]
        fn parity32_equals_popcount_parity(v: u32) {
            prop_assert_eq!(parity32(v), v.count_ones() & 1);
        }

        #[test]
        fn hparity_is_xor_of_four_bits(apndp: bool, addr_bits in 0u32..4, rnw: bool) {
            // Cross-check the formula directly rather than via Frame, since
            // read/write frames fix RnW.
            let a2 = addr_bits & 1;
            let a3 = (addr_bits >> 1) & 1;
            let expected = (apndp as u32) ^ (rnw as u32) ^ a2 ^ a3;
            let computed = parity_bit((apndp as u32) ^ (rnw as u32) ^ a2 ^ a3);
            prop_assert_eq!(computed, expected & 1);
        }
    }

    #[test]
    fn read_request_frame_length_is_46_bits() {
        let frame = Frame::read_request(true, 0x4);
        let total: u32 = frame.fields.iter().map(|f| f.width as u32).sum();
        assert_eq!(total, 46);
    }

    #[test]
    fn write_request_frame_length_is_46_bits() {
        let frame = Frame::write_request(true, 0x4, 0xDEAD_BEEF);
        let total: u32 = frame.fields.iter().map(|f| f.width as u32).sum();
        assert_eq!(total, 46);
    }

    proptest! {
        #[test]
        fn read_frame_hparity_matches_formula(apndp: bool, addr in 0u32..0x40) {
            let frame = Frame::read_request(apndp, addr);
            let a = (addr >> 2) & 0b11;
            let expected = parity_bit(apndp as u32 ^ 1 ^ a);
            assert_eq!(frame.fields[4].value, expected);
        }

        #[test]
        fn write_frame_hparity_matches_formula(apndp: bool, addr in 0u32..0x40) {
            let frame = Frame::write_request(apndp, addr, 0);
            let a = (addr >> 2) & 0b11;
            let expected = parity_bit(apndp as u32 ^ a);
            assert_eq!(frame.fields[4].value, expected);
        }
    }
}
