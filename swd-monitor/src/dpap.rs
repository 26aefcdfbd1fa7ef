//! DP/AP layer (C4): Debug Port and Access Port register abstractions,
//! bank select, AP CSW configuration, banked AP reads, and the generic
//! memory-read primitive, including the AP bank mirror that lets repeated
//! accesses to the same bank skip a DP SELECT write.

use mpsse_bsp::device::VendorDevice;

use crate::swd::{SwdLink, ACK_OK};

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
pub enum DpRegister {
    IdCodeOrAbort = 0x0,
    CtrlStatus = 0x4,
    Select = 0x8,
    RdBuff = 0xC,
}

#[derive(Clone, Copy, Debug)]
#[repr(u32)]
pub enum ApRegister {
    Csw = 0x00,
    Tar = 0x04,
    Drw = 0x0C,
    Bank0 = 0x10,
    Bank1 = 0x14,
    Bank2 = 0x18,
    Bank3 = 0x1C,
    Ident = 0xFC,
}

const DP_ABORT_CLEAR_STICKY: u32 = 0x1E;
const DP_CTRL_POWERUP: u32 = 0x5000_0000;

/// AP memory access width, as written into the low bits of CSW.
#[derive(Clone, Copy, Debug)]
pub enum ApSize {
    Byte,
    Halfword,
    Word,
}

impl ApSize {
    fn csw_bits(self) -> u32 {
        match self {
            ApSize::Byte => 0,
            ApSize::Halfword => 1,
            ApSize::Word => 2,
        }
    }
}

/// Session-scoped mirror of the DP SELECT / AP CSW registers, so repeated
/// accesses to the same bank or config skip the redundant SWD write. The
/// mirror is only updated after the corresponding write has actually been
/// queued, never before.
#[derive(Default)]
struct SessionMirror {
    ap_bank: Option<u32>,
    csw: Option<u32>,
}

pub struct DpAp<D: VendorDevice> {
    link: SwdLink<D>,
    mirror: SessionMirror,
}

const DP: bool = false;
const AP: bool = true;

impl<D: VendorDevice> DpAp<D> {
    pub fn new(link: SwdLink<D>) -> Self {
        DpAp {
            link,
            mirror: SessionMirror::default(),
        }
    }

    pub fn link_mut(&mut self) -> &mut SwdLink<D> {
        &mut self.link
    }

    pub fn into_link(self) -> SwdLink<D> {
        self.link
    }

    /// Read DP IDCODE, clear sticky errors, request power-up, and check the
    /// result. Returns the IDCODE on success.
    pub fn cpu_swd_start(&mut self) -> crate::error::Result<u32> {
        let id = self.link.swd_rd(DP, DpRegister::IdCodeOrAbort as u32)?;

        self.link
            .swd_wr(DP, DpRegister::IdCodeOrAbort as u32, DP_ABORT_CLEAR_STICKY)?;
        self.link
            .swd_wr(DP, DpRegister::CtrlStatus as u32, DP_CTRL_POWERUP)?;
        let status = self.link.swd_rd(DP, DpRegister::CtrlStatus as u32)?;

        if (status.data() >> 28) == 0xF {
            Ok(id.data())
        } else {
            Err(crate::error::SwdError::Powerup)
        }
    }

    /// Select the AP bank, skipping the DP SELECT write if the mirror
    /// already agrees.
    pub fn ap_bank_select(&mut self, bank: u32) {
        if self.mirror.ap_bank == Some(bank) {
            return;
        }
        let select = (bank & 0xF) << 4; // APBANKSEL in bits [4:7], APSEL=0, DPBANKSEL=0
        let _ = self.link.swd_wr(DP, DpRegister::Select as u32, select);
        self.mirror.ap_bank = Some(bank);
    }

    /// Select the bank from `addr`'s high nibble, then perform the
    /// canonical posted-read dance: the first AP read returns the
    /// *previous* result, the second latches and returns the current one.
    pub fn ap_banked_read(&mut self, addr: u32) -> crate::error::Result<crate::bitfield::Frame> {
        self.ap_bank_select(addr >> 4);
        let low = addr & 0xF;
        let _ = self.link.swd_rd(AP, low);
        self.link.swd_rd(AP, low)
    }

    /// Configure AP memory accesses: select bank 0 and write CSW with the
    /// given size/auto-increment, HProt1=1, MasterType=1.
    pub fn ap_config(&mut self, size: ApSize, auto_increment: bool) {
        self.ap_bank_select(0);
        let addr_inc = if auto_increment { 1 } else { 0 };
        let csw = size.csw_bits() | (addr_inc << 4) | (1 << 24) | (1 << 29);
        if self.mirror.csw == Some(csw) {
            return;
        }
        let _ = self.link.swd_wr(AP, ApRegister::Csw as u32, csw);
        self.mirror.csw = Some(csw);
    }

    /// Write TAR then emit two idle bytes so the target has time to latch
    /// the address before the next cycle.
    pub fn ap_addr(&mut self, addr: u32) {
        let _ = self.link.swd_wr(AP, ApRegister::Tar as u32, addr);
        self.link.swd_idle_bytes(2);
    }

    /// Immediate read of a 32-bit word at `addr`: set TAR, issue a dummy
    /// DRW read (drains the posted result of whatever preceded this call),
    /// then the real DRW read.
    pub fn cpu_mem_read32(&mut self, addr: u32) -> Option<u32> {
        self.ap_addr(addr);
        let _ = self.link.swd_rd(AP, ApRegister::Drw as u32);
        let result = self.link.swd_rd(AP, ApRegister::Drw as u32);
        match result {
            Ok(frame) if frame.ack() == ACK_OK => Some(frame.data()),
            _ => None,
        }
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
    fn ap_bank_select_skips_redundant_write() {
        let mut dpap = DpAp::new(link_with_reads(vec![ack_chunk(ACK_OK)]));
        dpap.ap_bank_select(1);
        dpap.ap_bank_select(1);
        let written = dpap.into_link().into_transport().into_device().take_written();
        assert_eq!(written.len(), 1, "second select with the same bank must not flush");
    }

    #[test]
    fn ap_config_skips_redundant_write() {
        let mut dpap = DpAp::new(link_with_reads(vec![ack_chunk(ACK_OK), ack_chunk(ACK_OK)]));
        dpap.ap_config(ApSize::Word, false);
        dpap.ap_config(ApSize::Word, false);
        let written = dpap.into_link().into_transport().into_device().take_written();
        // ap_bank_select(0) flushes once, the CSW write flushes once; the
        // second ap_config call's bank select and CSW write both hit the
        // mirror and flush nothing.
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn cpu_swd_start_returns_idcode_on_powerup() {
        let mut reads = read_chunks(ACK_OK, 0x2BA0_1477); // IDCODE
        reads.push(ack_chunk(ACK_OK)); // ABORT write
        reads.push(ack_chunk(ACK_OK)); // CTRL write
        reads.extend(read_chunks(ACK_OK, 0xF000_0000)); // STATUS, powered up
        let mut dpap = DpAp::new(link_with_reads(reads));
        assert_eq!(dpap.cpu_swd_start().unwrap(), 0x2BA0_1477);
    }

    #[test]
    fn cpu_swd_start_fails_when_status_never_reaches_powerup() {
        let mut reads = read_chunks(ACK_OK, 0x2BA0_1477);
        reads.push(ack_chunk(ACK_OK));
        reads.push(ack_chunk(ACK_OK));
        reads.extend(read_chunks(ACK_OK, 0x0000_0000)); // top nibble != 0xF
        let mut dpap = DpAp::new(link_with_reads(reads));
        assert_eq!(
            dpap.cpu_swd_start().unwrap_err(),
            crate::error::SwdError::Powerup
        );
    }

    #[test]
    fn cpu_swd_start_fails_on_idcode_wait() {
        const ACK_WAIT: u8 = 0b010;
        let mut dpap = DpAp::new(link_with_reads(read_chunks(ACK_WAIT, 0)));
        assert_eq!(
            dpap.cpu_swd_start().unwrap_err(),
            crate::error::SwdError::AckWait
        );
    }

    #[test]
    fn ap_banked_read_returns_the_second_reads_value() {
        // ap_bank_select(1) writes DP SELECT (Ack only), then two AP reads.
        let mut reads = vec![ack_chunk(ACK_OK)];
        reads.extend(read_chunks(ACK_OK, 0x1111_1111)); // dummy, discarded
        reads.extend(read_chunks(ACK_OK, 0x2222_2222)); // latched value
        let mut dpap = DpAp::new(link_with_reads(reads));
        let frame = dpap.ap_banked_read(0x14).unwrap();
        assert_eq!(frame.data(), 0x2222_2222);
    }

    #[test]
    fn cpu_mem_read32_returns_none_on_fault() {
        // ap_addr writes TAR (Ack only), then a dummy DRW read, then the
        // real DRW read which faults.
        let mut reads = vec![ack_chunk(ACK_OK)];
        reads.extend(read_chunks(ACK_OK, 0));
        reads.extend(read_chunks(0b100, 0));
        let mut dpap = DpAp::new(link_with_reads(reads));
        assert_eq!(dpap.cpu_mem_read32(0x2000_0008), None);
    }

    #[test]
    fn cpu_mem_read32_returns_the_latched_word() {
        let mut reads = vec![ack_chunk(ACK_OK)];
        reads.extend(read_chunks(ACK_OK, 0)); // dummy DRW read
        reads.extend(read_chunks(ACK_OK, 0xDEAD_BEEF));
        let mut dpap = DpAp::new(link_with_reads(reads));
        assert_eq!(dpap.cpu_mem_read32(0x2000_0008), Some(0xDEAD_BEEF));
    }
}
