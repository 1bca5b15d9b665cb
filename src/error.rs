//! Unified error types for the protocol engine.
//!
//! One `Error` enum that every subsystem converts into, keeping the
//! command-issuing caller's error handling uniform. All variants are `Copy`
//! so they can be passed out of the completion context without allocation.
//!
//! Framing and decode errors on the RX path are absorbed locally (logged,
//! chunk or frame dropped, stream continues); only command, firmware-load
//! and bring-up failures propagate through `Result`.

use core::fmt;

/// Every fallible operation in the engine funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A command payload exceeds the command buffer capacity, or a batched
    /// read asks for more registers than one command can carry.
    InvalidArgument,
    /// No matching response arrived within the command timeout.
    Timeout,
    /// The response length, known in advance, differs from what arrived.
    SizeMismatch,
    /// The transport failed to accept or complete a transfer.
    Transport(TransportError),
    /// Unrecognized PHY modulation or PLCP rate code.
    UnsupportedEncoding,
    /// A firmware chunk transferred fewer bytes than requested.
    ShortWrite,
    /// A firmware blob was not found by the image source.
    FirmwareNotFound(&'static str),
    /// The echo self-test returned a different value than sent.
    EchoMismatch,
    /// All 64 pairwise key slots are in use.
    KeyTableFull,
    /// The session is shutting down; no further commands are accepted.
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Timeout => write!(f, "command timed out"),
            Self::SizeMismatch => write!(f, "response size mismatch"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::UnsupportedEncoding => write!(f, "unsupported PHY encoding"),
            Self::ShortWrite => write!(f, "short firmware write"),
            Self::FirmwareNotFound(name) => write!(f, "firmware {name} not found"),
            Self::EchoMismatch => write!(f, "echo self-test mismatch"),
            Self::KeyTableFull => write!(f, "key table full"),
            Self::Shutdown => write!(f, "session shut down"),
        }
    }
}

impl std::error::Error for Error {}

// ── Transport errors ─────────────────────────────────────────

/// Failure reported by the asynchronous transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The device is gone; no transfer will ever complete.
    Disconnected,
    /// The endpoint stalled.
    Stall,
    /// The device sent more data than the buffer holds. Treated as
    /// "device died" on the RX stream.
    Overflow,
    /// Any other completion error.
    Other,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "device disconnected"),
            Self::Stall => write!(f, "endpoint stall"),
            Self::Overflow => write!(f, "buffer overflow"),
            Self::Other => write!(f, "transfer failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ── RX stream framing errors ─────────────────────────────────

/// Why demultiplexing of one inbound buffer was aborted.
///
/// Never fatal to the stream: the rest of the buffer is dropped and the
/// buffer is resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// The chunk tag's high byte was not the stream sentinel.
    BadTag,
    /// The chunk length points past the end of the buffer.
    Truncated,
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadTag => write!(f, "missing stream tag"),
            Self::Truncated => write!(f, "truncated chunk"),
        }
    }
}

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
