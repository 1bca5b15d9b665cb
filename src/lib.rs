//! Host-side engine for ar9170-family USB 802.11n devices.
//!
//! The device speaks two channels over one USB interface: a command
//! channel (interrupt endpoints, one command in flight, 200 ms timeout)
//! and a bulk data channel running in stream mode, where command responses
//! and received frames share the same inbound buffers and are told apart
//! by a filler-byte convention.
//!
//! The crate is transport-agnostic: everything that touches USB goes
//! through the [`transport::Transport`] trait, and everything going up the
//! stack leaves through the sink traits in [`ports`]. A [`session::Session`]
//! owns one attached device end to end, from firmware upload through
//! steady-state RX demultiplexing to synchronous teardown.

pub mod error;
pub mod fw;
pub mod mpdu;
pub mod ports;
pub mod regbatch;
pub mod rx;
pub mod session;
pub mod transport;
pub mod wire;

mod cmd;

pub use cmd::{CMD_TIMEOUT, MAX_RESPONSE_LEN, Response};
pub use error::{Error, FramingError, Result, TransportError};
pub use session::{DeviceGuard, FilterRequest, KeyAlg, NUM_RX_SLOTS, Session};
