//! Batched register writes.
//!
//! Bring-up and filter programming touch long runs of registers; issuing
//! one write command per register would serialize each behind a full
//! command round trip. The writer accumulates address/value pairs and
//! flushes a multi-write command whenever the next pair would no longer
//! fit, so up to seven writes travel in one 64-byte command buffer.
//!
//! Errors are sticky: after the first failed flush the writer stops
//! talking to the device, and `finish()` reports that first error.

use crate::error::{Error, Result};
use crate::session::DeviceGuard;
use crate::transport::Transport;
use crate::wire::{self, Cmd};

/// Accumulates register writes and flushes them in batches.
///
/// Call [`finish`](Self::finish) when done; dropping the writer with
/// unflushed pairs loses them.
pub struct RegWriter<'w, 'a, T: Transport> {
    dev: &'w mut DeviceGuard<'a, T>,
    buf: heapless::Vec<u8, { wire::MAX_CMD_PAYLOAD }>,
    err: Option<Error>,
}

impl<'w, 'a, T: Transport> RegWriter<'w, 'a, T> {
    pub(crate) fn new(dev: &'w mut DeviceGuard<'a, T>) -> Self {
        Self {
            dev,
            buf: heapless::Vec::new(),
            err: None,
        }
    }

    /// Queue one register write, flushing first if the batch is full.
    pub fn write(&mut self, reg: u32, val: u32) {
        if self.err.is_some() {
            return;
        }
        if self.buf.len() + 8 > wire::MAX_CMD_PAYLOAD {
            self.flush();
            if self.err.is_some() {
                return;
            }
        }
        // Capacity was just ensured.
        let _ = self.buf.extend_from_slice(&reg.to_le_bytes());
        let _ = self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Push any queued pairs to the device now.
    pub fn flush(&mut self) {
        if self.err.is_some() || self.buf.is_empty() {
            return;
        }
        let res = self.dev.exec_cmd(Cmd::Wreg, &self.buf, Some(0));
        self.buf.clear();
        if let Err(e) = res {
            self.err = Some(e);
        }
    }

    /// Flush the remainder and report the first error seen, if any.
    pub fn finish(mut self) -> Result<()> {
        self.flush();
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
