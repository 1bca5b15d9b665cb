//! MPDU record decoding.
//!
//! A data record from the RX stream carries one received 802.11 frame,
//! sandwiched between a 12-byte head descriptor (the raw PLCP preamble)
//! and a 24-byte tail descriptor (RSSI, EVM, error and status bytes).
//!
//! Decoding is deliberately incomplete where the hardware interface is:
//! HT and duplicate-OFDM modulations are unsupported and such frames are
//! dropped, as are frames whose PLCP rate byte matches no known code.

use log::debug;

use crate::wire::{self, Band, RxHead, RxTail};

bitflags::bitflags! {
    /// Semantic receive flags derived from the hardware error/status bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RxFlags: u32 {
        /// Michael MIC verification failed.
        const MMIC_ERROR      = 1 << 0;
        /// PLCP checksum failed.
        const FAILED_PLCP_CRC = 1 << 1;
        /// Frame check sequence failed.
        const FAILED_FCS_CRC  = 1 << 2;
        /// Short CCK preamble.
        const SHORT_PREAMBLE  = 1 << 3;
        /// The hardware already decrypted the frame.
        const DECRYPTED       = 1 << 4;
    }
}

/// Metadata delivered alongside each frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMeta {
    pub band: Band,
    pub freq_mhz: u32,
    /// Combined RSSI, post-processed into the 7-bit range.
    pub signal: u8,
    /// Bitmask of antennas that saw the frame.
    pub antenna: u8,
    /// Index into the band's rate table.
    pub rate_idx: u8,
    pub flags: RxFlags,
}

/// Radio facts the decoder needs from the session.
#[derive(Debug, Clone, Copy)]
pub struct RadioInfo {
    pub band: Band,
    pub freq_mhz: u32,
}

/// Why a data record was dropped instead of delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpduDrop {
    /// Shorter than head + tail descriptors plus the FCS.
    Runt,
    /// HT/duplicate-OFDM modulation or unknown PLCP rate code.
    UnsupportedEncoding,
    /// Unrecognized hardware error bits remained after masking.
    ErrorBits(u8),
}

/// Decode one data record into `(frame_body, metadata)`.
///
/// The body slice sits between the two descriptors and includes the FCS.
pub fn decode<'a>(buf: &'a [u8], radio: RadioInfo) -> Result<(&'a [u8], RxMeta), MpduDrop> {
    if buf.len() <= wire::RX_HEAD_LEN + wire::RX_TAIL_LEN + wire::FCS_LEN {
        return Err(MpduDrop::Runt);
    }
    let mpdu_len = buf.len() - wire::RX_HEAD_LEN - wire::RX_TAIL_LEN;

    let head = RxHead::parse(buf).ok_or(MpduDrop::Runt)?;
    let mut tail = RxTail::parse(&buf[wire::RX_HEAD_LEN + mpdu_len..]).ok_or(MpduDrop::Runt)?;

    // Antenna presence is judged on the raw per-antenna values; 0x80 means
    // "antenna saw nothing".
    let mut antenna = 0u8;
    for i in 0..3 {
        if tail.rssi[i] != 0x80 {
            antenna |= 1 << i;
        }
    }

    // Fold negative-appearing raw RSSI back into the 7-bit range.
    for r in &mut tail.rssi {
        if *r & 0x80 != 0 {
            *r = ((*r & 0x7f) + 1) & 0x7f;
        }
    }

    let mut flags = RxFlags::empty();
    let rate_idx = match tail.status & wire::RX_STATUS_MODULATION_MASK {
        wire::RX_STATUS_MODULATION_CCK => {
            if tail.status & wire::RX_STATUS_SHORT_PREAMBLE != 0 {
                flags |= RxFlags::SHORT_PREAMBLE;
            }
            wire::cck_rate_index(head.plcp[0]).ok_or_else(|| {
                debug!("invalid plcp cck rate {:#x}", head.plcp[0]);
                MpduDrop::UnsupportedEncoding
            })?
        }
        wire::RX_STATUS_MODULATION_OFDM => {
            let idx = wire::ofdm_rate_index(head.plcp[0]).ok_or_else(|| {
                debug!("invalid plcp ofdm rate {:#x}", head.plcp[0]);
                MpduDrop::UnsupportedEncoding
            })?;
            // The 2 GHz rate table opens with the four CCK rates.
            if radio.band == Band::Ghz2 { idx + 4 } else { idx }
        }
        _ => {
            debug!("invalid modulation {:#x}", tail.status);
            return Err(MpduDrop::UnsupportedEncoding);
        }
    };

    let mut error = tail.error;

    if error & wire::RX_ERROR_MMIC != 0 {
        flags |= RxFlags::MMIC_ERROR;
        error &= !wire::RX_ERROR_MMIC;
    }
    if error & wire::RX_ERROR_PLCP != 0 {
        flags |= RxFlags::FAILED_PLCP_CRC;
        error &= !wire::RX_ERROR_PLCP;
    }
    if error & wire::RX_ERROR_FCS != 0 {
        flags |= RxFlags::FAILED_FCS_CRC;
        error &= !wire::RX_ERROR_FCS;
    }

    let decrypt = tail.decrypt_type();
    if decrypt & wire::RX_ENC_SOFTWARE == 0 && decrypt != wire::ENC_ALG_NONE {
        flags |= RxFlags::DECRYPTED;
    }

    // Wrong-RA errors are expected in promiscuous-ish setups; ignore them.
    error &= !wire::RX_ERROR_WRONG_RA;

    if error & wire::RX_ERROR_DECRYPT != 0 {
        error &= !wire::RX_ERROR_DECRYPT;
        debug!("decrypt error");
    }

    if error != 0 {
        debug!("rx errors: {:#x}", error);
        return Err(MpduDrop::ErrorBits(error));
    }

    let meta = RxMeta {
        band: radio.band,
        freq_mhz: radio.freq_mhz,
        signal: tail.rssi[6],
        antenna,
        rate_idx,
        flags,
    };

    Ok((&buf[wire::RX_HEAD_LEN..wire::RX_HEAD_LEN + mpdu_len], meta))
}

// ── Tests ────────────────────────────────────────────────────
