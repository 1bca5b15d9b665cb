//! On-the-wire formats of the AR9170 firmware interface.
//!
//! Command buffer (bulk out, command endpoint):
//! ```text
//! ┌──────────────────────────┬───────────────────┐
//! │ u32 LE: len | (cmd << 8) │ payload (len B)   │
//! └──────────────────────────┴───────────────────┘
//! ```
//! total size bounded by [`MAX_CMD_LEN`].
//!
//! RX stream chunk (bulk in, stream mode):
//! ```text
//! ┌────────────┬───────────────┬──────────────────────────┐
//! │ u16 LE clen│ u16 tag       │ round_up(clen, 4) bytes  │
//! │            │ high B = 0x4e │ (payload is clen bytes)  │
//! └────────────┴───────────────┴──────────────────────────┘
//! ```
//! Command responses inside a chunk are preceded by up to six `0xff 0xff`
//! filler pairs; consuming exactly six is what marks a chunk as a response
//! rather than device data.

use bitflags::bitflags;

/// Maximum size of one command buffer, header included.
pub const MAX_CMD_LEN: usize = 64;

/// Maximum command payload (one header word is always present).
pub const MAX_CMD_PAYLOAD: usize = MAX_CMD_LEN - 4;

/// Command payload capacity in 32-bit words.
pub const PAYLOAD_MAX_WORDS: usize = MAX_CMD_LEN / 4 - 1;

/// Upper bound of one inbound stream buffer.
pub const MAX_RX_BUFFER_SIZE: usize = 8192;

/// High byte of the per-chunk tag in the RX stream.
pub const STREAM_SENTINEL: u8 = 0x4e;

/// Filler byte padding command responses.
pub const FILLER_BYTE: u8 = 0xff;

/// Filler run (six `0xff 0xff` pairs) that marks a command response.
pub const MAX_FILLER_LEN: usize = 12;

/// Fixed-size descriptor in front of every received MPDU.
pub const RX_HEAD_LEN: usize = 12;

/// Fixed-size descriptor behind every received MPDU.
pub const RX_TAIL_LEN: usize = 24;

/// Frame check sequence length; MPDU bodies include it.
pub const FCS_LEN: usize = 4;

/// Firmware download control request.
pub const FW_DL_REQUEST: u8 = 0x30;

/// Firmware download completion control request (zero-length).
pub const FW_DL_COMPLETE_REQUEST: u8 = 0x31;

// ── Command opcodes ──────────────────────────────────────────

/// Firmware command opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    /// Read a batch of 32-bit registers.
    Rreg = 0x00,
    /// Write a batch of (register, value) pairs.
    Wreg = 0x01,
    /// Program a crypto key slot. A 28-byte payload installs a key; a
    /// 4-byte payload (just the slot id) disables one.
    Ekey = 0x28,
    /// Echo self-test.
    Echo = 0x80,
}

/// Build the little-endian command header word: `len | (cmd << 8)`.
pub fn cmd_header(cmd: Cmd, plen: usize) -> u32 {
    plen as u32 | (u32::from(cmd as u8) << 8)
}

/// Round a chunk length up to the stream's 4-byte granularity.
pub fn round_up4(len: usize) -> usize {
    (len + 3) & !3
}

// ── Register map (subset the engine programs itself) ─────────

pub const GPIO_REG_PORT_TYPE: u32 = 0x1d0100;
pub const GPIO_REG_PORT_DATA: u32 = 0x1d0104;

pub const MAC_REG_ROLL_CALL_TBL_L: u32 = 0x1c3140;
pub const MAC_REG_ROLL_CALL_TBL_H: u32 = 0x1c3144;
pub const MAC_REG_GROUP_HASH_TBL_L: u32 = 0x1c3624;
pub const MAC_REG_GROUP_HASH_TBL_H: u32 = 0x1c3628;
pub const MAC_REG_FRAMETYPE_FILTER: u32 = 0x1c368c;

bitflags! {
    /// Frame-type filter register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFilter: u32 {
        const PSPOLL  = 1 << 26;
        const RTS     = 1 << 27;
        const CTS     = 1 << 28;
        const ACK     = 1 << 29;
        const CFE     = 1 << 30;
        const CFE_ACK = 1 << 31;
        /// Management and data frames the MAC always accepts.
        const DEFAULTS = 0x0500_ffff;
    }
}

// ── RX descriptor status/error bits ──────────────────────────

pub const RX_STATUS_MODULATION_MASK: u8 = 0x03;
pub const RX_STATUS_MODULATION_CCK: u8 = 0x00;
pub const RX_STATUS_MODULATION_OFDM: u8 = 0x01;
pub const RX_STATUS_MODULATION_HT: u8 = 0x02;
pub const RX_STATUS_MODULATION_DUPOFDM: u8 = 0x03;
pub const RX_STATUS_SHORT_PREAMBLE: u8 = 0x08;

pub const RX_ERROR_SPI: u8 = 0x01;
pub const RX_ERROR_DECRYPT: u8 = 0x02;
pub const RX_ERROR_FCS: u8 = 0x04;
pub const RX_ERROR_WRONG_RA: u8 = 0x08;
pub const RX_ERROR_PLCP: u8 = 0x10;
pub const RX_ERROR_MMIC: u8 = 0x20;

/// Hardware key-table algorithm codes.
pub const ENC_ALG_NONE: u8 = 0;
pub const ENC_ALG_WEP64: u8 = 1;
pub const ENC_ALG_WEP128: u8 = 2;
pub const ENC_ALG_TKIP: u8 = 3;
pub const ENC_ALG_AESCCMP: u8 = 4;

/// Set in the decrypt type when the frame was left to software.
pub const RX_ENC_SOFTWARE: u8 = 0x08;

// ── RX descriptors ───────────────────────────────────────────

/// Head descriptor: the raw PLCP preamble of the frame.
#[derive(Debug, Clone, Copy)]
pub struct RxHead {
    pub plcp: [u8; RX_HEAD_LEN],
}

impl RxHead {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let plcp: [u8; RX_HEAD_LEN] = buf.get(..RX_HEAD_LEN)?.try_into().ok()?;
        Some(Self { plcp })
    }
}

/// Tail descriptor: RSSI, EVM and error/status reporting.
///
/// `rssi[0..3]` are the per-antenna values, `rssi[3..6]` their extension
/// counterparts, `rssi[6]` the combined value.
#[derive(Debug, Clone, Copy)]
pub struct RxTail {
    pub rssi: [u8; 7],
    pub evm_stream0: [u8; 6],
    pub evm_stream1: [u8; 6],
    pub phy_err: u8,
    pub sa_idx: u8,
    pub da_idx: u8,
    pub error: u8,
    pub status: u8,
}

impl RxTail {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < RX_TAIL_LEN {
            return None;
        }
        let mut rssi = [0u8; 7];
        rssi.copy_from_slice(&buf[0..7]);
        let mut evm_stream0 = [0u8; 6];
        evm_stream0.copy_from_slice(&buf[7..13]);
        let mut evm_stream1 = [0u8; 6];
        evm_stream1.copy_from_slice(&buf[13..19]);
        Some(Self {
            rssi,
            evm_stream0,
            evm_stream1,
            phy_err: buf[19],
            sa_idx: buf[20],
            da_idx: buf[21],
            error: buf[22],
            status: buf[23],
        })
    }

    /// Which key-table algorithm the hardware applied to this frame.
    pub fn decrypt_type(&self) -> u8 {
        (self.sa_idx & 0xc0) >> 4 | (self.da_idx & 0xc0) >> 6
    }
}

// ── PLCP rate lookup ─────────────────────────────────────────

/// Map a CCK PLCP rate byte to a rate-table index.
pub fn cck_rate_index(plcp0: u8) -> Option<u8> {
    match plcp0 {
        0x0a => Some(0),
        0x14 => Some(1),
        0x37 => Some(2),
        0x6e => Some(3),
        _ => None,
    }
}

/// Map the low nibble of an OFDM PLCP signal field to a rate-table index.
pub fn ofdm_rate_index(plcp0: u8) -> Option<u8> {
    match plcp0 & 0xf {
        0xb => Some(0),
        0xf => Some(1),
        0xa => Some(2),
        0xe => Some(3),
        0x9 => Some(4),
        0xd => Some(5),
        0x8 => Some(6),
        0xc => Some(7),
        _ => None,
    }
}

/// Radio band, as far as RX metadata cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Ghz2,
    Ghz5,
}

// ── Tests ────────────────────────────────────────────────────
