//! Upstream collaborator traits.
//!
//! The engine is generic over these ports, so wiring it into a MAC stack,
//! a packet capture tool or a test harness requires zero changes to the
//! protocol logic. All sink methods are fire-and-forget and may be called
//! from the transport's completion context.

use crate::mpdu::RxMeta;

/// Receiver of successfully decoded MPDUs.
pub trait FrameSink {
    /// Deliver one frame body (FCS included) plus derived metadata.
    fn deliver(&self, frame: &[u8], meta: &RxMeta);
}

/// TX status notification, reported by the firmware out of band.
///
/// Informational only: the reference driver does not feed it back into
/// rate control yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub mac: [u8; 6],
    pub rate: u32,
    pub status: u16,
}

/// Receiver of out-of-band device notifications.
pub trait EventSink {
    /// A TX status record arrived.
    fn tx_status(&self, _status: TxStatus) {}

    /// The firmware hit the pre-TBTT point; the beacon should be
    /// regenerated. Only raised for AP-role sessions.
    fn beacon_trigger(&self) {}
}

/// Firmware image lookup, keyed by blob name.
pub trait FirmwareSource {
    fn get(&self, name: &str) -> Option<&[u8]>;
}

/// Sink that drops everything. Handy for sessions without an upper layer.
pub struct NullSink;

impl FrameSink for NullSink {
    fn deliver(&self, _frame: &[u8], _meta: &RxMeta) {}
}

impl EventSink for NullSink {}
