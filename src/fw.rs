//! Firmware upload.
//!
//! The device boots in two stages: initial values into RAM, then the
//! firmware proper, which is started by a zero-length "download complete"
//! control transfer. Images are pushed in 4096-byte control transfers at a
//! monotonically increasing target address; the address travels in the
//! control request's value field, shifted down by 8.

use std::thread;
use std::time::Duration;

use log::debug;

use crate::error::{Error, Result};
use crate::ports::FirmwareSource;
use crate::transport::Transport;
use crate::wire::{FW_DL_COMPLETE_REQUEST, FW_DL_REQUEST};

/// One control transfer's worth of image data.
pub const FW_CHUNK_LEN: usize = 4096;

/// First-stage blob: initial values for device RAM.
pub const FW_PART1_NAME: &str = "ar9170-1.fw";
/// Second-stage blob: the firmware itself.
pub const FW_PART2_NAME: &str = "ar9170-2.fw";

pub const FW_PART1_ADDR: u32 = 0x0010_2800;
pub const FW_PART2_ADDR: u32 = 0x0020_0000;

/// Pause between the two upload stages while the device digests stage one.
const FW_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Push one image to `addr`, optionally telling the device to start it.
///
/// A chunk that transfers short is fatal to the load; the finalize step is
/// then never attempted.
pub fn load<T: Transport>(transport: &T, image: &[u8], addr: u32, finalize: bool) -> Result<()> {
    let mut addr = addr;
    for chunk in image.chunks(FW_CHUNK_LEN) {
        let done = transport.fw_write(FW_DL_REQUEST, (addr >> 8) as u16, chunk)?;
        if done != chunk.len() {
            debug!("firmware chunk at {addr:#x}: wrote {done} of {} bytes", chunk.len());
            return Err(Error::ShortWrite);
        }
        addr += chunk.len() as u32;
    }

    if finalize {
        // No retry: if the device refuses to start, bring-up fails.
        transport.fw_write(FW_DL_COMPLETE_REQUEST, 0, &[])?;
    }

    Ok(())
}

/// Run the full two-stage upload from a blob source.
pub fn upload<T: Transport, S: FirmwareSource>(transport: &T, source: &S) -> Result<()> {
    let part1 = source
        .get(FW_PART1_NAME)
        .ok_or(Error::FirmwareNotFound(FW_PART1_NAME))?;
    load(transport, part1, FW_PART1_ADDR, false)?;

    // Let stage one settle before starting the real firmware.
    thread::sleep(FW_SETTLE_DELAY);

    let part2 = source
        .get(FW_PART2_NAME)
        .ok_or(Error::FirmwareNotFound(FW_PART2_NAME))?;
    load(transport, part2, FW_PART2_ADDR, true)
}
