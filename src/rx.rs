//! RX stream demultiplexer.
//!
//! The bulk-in endpoint runs in stream mode: one completed buffer carries
//! zero or more self-delimiting chunks, each a 4-byte header (`u16` LE
//! length, `u16` tag whose high byte must be [`STREAM_SENTINEL`]) followed
//! by the payload padded to 4 bytes.
//!
//! Inside a chunk, the firmware pads command responses with up to six
//! `0xff 0xff` filler pairs. The number of filler bytes consumed is the
//! *sole* discriminator between record kinds: exactly twelve means the
//! remainder is a reply to something the driver asked, anything less means
//! unsolicited device data. The parser must stop at the sixth pair even if
//! a seventh follows; that one belongs to the record.
//!
//! Framing errors abort the current buffer only. The stream-mode transport
//! accepts that data is lost; the buffer goes straight back to the device.

use crate::error::FramingError;
use crate::wire::{FILLER_BYTE, MAX_FILLER_LEN, STREAM_SENTINEL, round_up4};

/// One record extracted from an inbound buffer.
///
/// Borrows from the buffer: records live only as long as the processing of
/// the buffer they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRecord<'a> {
    /// Command-response record (preceded by the full filler run).
    Command(&'a [u8]),
    /// Device data: a received MPDU.
    Data(&'a [u8]),
}

/// Iterator over the records of one inbound buffer.
///
/// Yields `Err` at most once; after a framing error the remainder of the
/// buffer is abandoned.
pub struct StreamParser<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> StreamParser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    /// Bytes left over after iteration ended. 1 to 3 trailing bytes are a
    /// protocol anomaly worth logging; more means iteration was aborted.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl<'a> Iterator for StreamParser<'a> {
    type Item = Result<StreamRecord<'a>, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let rest = &self.buf[self.pos..];
            if rest.len() < 4 {
                return None;
            }

            let clen = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
            let wlen = round_up4(clen);

            if rest[3] != STREAM_SENTINEL {
                self.failed = true;
                return Some(Err(FramingError::BadTag));
            }
            if wlen > rest.len() - 4 {
                self.failed = true;
                return Some(Err(FramingError::Truncated));
            }

            let mut payload = &rest[4..4 + clen];
            self.pos += 4 + wlen;

            // Filler detection. The pairing matters: a lone 0xff never
            // counts, and the run is capped at MAX_FILLER_LEN bytes.
            let mut skipped = 0;
            while payload.len() > 2
                && skipped < MAX_FILLER_LEN
                && payload[0] == FILLER_BYTE
                && payload[1] == FILLER_BYTE
            {
                payload = &payload[2..];
                skipped += 2;
            }

            if payload.len() < 4 {
                continue;
            }

            return Some(Ok(if skipped == MAX_FILLER_LEN {
                StreamRecord::Command(payload)
            } else {
                StreamRecord::Data(payload)
            }));
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
