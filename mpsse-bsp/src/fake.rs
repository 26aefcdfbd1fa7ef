//! A scripted [`VendorDevice`] fake used by this crate's own tests and by
//! `swd-monitor`'s integration tests. It records every queued write and
//! replays a canned sequence of reads, so the whole MPSSE/SWD/DP-AP/poll
//! stack above it can be exercised without real hardware.

use std::collections::VecDeque;
use std::time::Duration;

use crate::device::{BitMode, DeviceInfo, VendorDevice};
use crate::error::{Error, Result};

pub struct FakeDevice {
    written: Vec<Vec<u8>>,
    reads: VecDeque<Vec<u8>>,
}

impl FakeDevice {
    pub fn with_scripted_reads(reads: Vec<Vec<u8>>) -> Self {
        FakeDevice {
            written: Vec::new(),
            reads: reads.into(),
        }
    }

    /// All bytes ever queued to the device, one entry per `write` call.
    pub fn take_written(self) -> Vec<Vec<u8>> {
        self.written
    }

    /// Flattened view of every byte ever queued, in order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.written.iter().flatten().copied().collect()
    }
}

impl VendorDevice for FakeDevice {
    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_usb_parameters(&mut self, _buffer_len: u32) -> Result<()> {
        Ok(())
    }

    fn disable_event_chars(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_timeouts(&mut self, _read: Duration, _write: Duration) -> Result<()> {
        Ok(())
    }

    fn set_latency_timer(&mut self, _latency: Duration) -> Result<()> {
        Ok(())
    }

    fn set_bit_mode(&mut self, _pin_mask: u8, _mode: BitMode) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.written.push(data.to_vec());
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(chunk) = self.reads.pop_front() else {
            return Err(Error::ReadTimeout {
                want: buf.len(),
                got: 0,
            });
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        Ok(n)
    }

    fn device_info(&mut self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            type_code: 0,
            description: "fake".to_string(),
        })
    }
}
