//! Transport abstraction — the asynchronous bulk/control I/O boundary.
//!
//! Concrete implementations wrap a USB stack: bulk-out submissions on the
//! command endpoint, control transfers for firmware download, and a fixed
//! pool of long-lived bulk-in buffers identified by slot index.
//!
//! The engine never sees completion callbacks directly; whoever owns the
//! transport feeds completed inbound buffers back through
//! [`Session::rx_completed`](crate::session::Session::rx_completed).
//!
//! Outbound command submission is synchronous from the engine's point of
//! view (the reference transport bounds it with its own timeout); the
//! *response* is what arrives asynchronously.

use crate::error::TransportError;

/// Byte-oriented device transport.
pub trait Transport {
    /// Submit one complete command buffer on the command endpoint.
    fn submit_command(&self, buf: &[u8]) -> Result<(), TransportError>;

    /// Issue one firmware-download control transfer.
    ///
    /// Returns the number of bytes actually transferred, which the caller
    /// must check against `data.len()`.
    fn fw_write(&self, request: u8, value: u16, data: &[u8]) -> Result<usize, TransportError>;

    /// (Re)arm the inbound stream buffer identified by `slot`.
    fn submit_rx(&self, slot: usize) -> Result<(), TransportError>;

    /// Cancel the inbound buffer in `slot`. Blocks until the transport has
    /// acknowledged the cancellation; after return the buffer memory may be
    /// released.
    fn cancel_rx(&self, slot: usize);
}

/// A transport that accepts every submission and never produces data.
/// Useful as a default while no device is attached, and in tests.
pub struct NullTransport;

impl Transport for NullTransport {
    fn submit_command(&self, _buf: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }

    fn fw_write(&self, _request: u8, _value: u16, data: &[u8]) -> Result<usize, TransportError> {
        Ok(data.len())
    }

    fn submit_rx(&self, _slot: usize) -> Result<(), TransportError> {
        Ok(())
    }

    fn cancel_rx(&self, _slot: usize) {}
}
