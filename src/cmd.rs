//! Pending-command state and command-response record handling.
//!
//! One command is in flight per session at most; the session's exclusive
//! lock enforces that. What this module owns is the handoff between the
//! command-issuing thread (arm, wait, time out) and the transport's
//! completion context (match, copy, signal).
//!
//! The handoff is the one genuine race in the engine: a response may arrive
//! after the waiter has given up. The reply slot is therefore a small
//! mutex-guarded state machine — whichever path moves it out of `Armed`
//! first wins, and the loser sees "nothing to do" and exits without error.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::ports::{EventSink, TxStatus};

/// How long a command may wait for its response.
pub const CMD_TIMEOUT: Duration = Duration::from_millis(200);

/// Response payload capacity. The length travels in the header's low byte,
/// so no response can exceed this.
pub const MAX_RESPONSE_LEN: usize = 256;

/// Response bytes handed back to the caller.
pub type Response = heapless::Vec<u8, MAX_RESPONSE_LEN>;

/// Notification type byte: both top bits set.
const NOTIFICATION_MASK: u8 = 0xc0;
/// Pre-TBTT beacon trigger notification.
const NOTIFY_TBTT: u8 = 0xc0;
/// TX status notification.
const NOTIFY_TX_STATUS: u8 = 0xc1;

enum ReplyState {
    /// No command outstanding.
    Idle,
    /// A command is in flight. `echo` is the header word it was sent with,
    /// `expect` the response length if known in advance.
    Armed { echo: u32, expect: Option<usize> },
    /// The response arrived and was matched.
    Done(Response),
}

/// The single pending-command slot of a session.
pub(crate) struct PendingReply {
    state: Mutex<ReplyState>,
    done: Condvar,
}

impl PendingReply {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReplyState::Idle),
            done: Condvar::new(),
        }
    }

    /// Arm the slot for the command about to be submitted.
    pub fn arm(&self, echo: u32, expect: Option<usize>) {
        let mut st = self.state.lock().unwrap();
        *st = ReplyState::Armed { echo, expect };
    }

    /// Invalidate the slot, e.g. when submission failed after arming.
    pub fn disarm(&self) {
        let mut st = self.state.lock().unwrap();
        *st = ReplyState::Idle;
    }

    /// Block until the armed command completes or `timeout` expires.
    ///
    /// On timeout the slot is invalidated *before* returning, so a response
    /// arriving later finds nothing to complete.
    pub fn wait(&self, timeout: Duration) -> Result<Response> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock().unwrap();
        loop {
            match &*st {
                ReplyState::Done(_) => {
                    let ReplyState::Done(resp) = std::mem::replace(&mut *st, ReplyState::Idle)
                    else {
                        unreachable!()
                    };
                    return Ok(resp);
                }
                ReplyState::Armed { .. } => {
                    let now = Instant::now();
                    if now >= deadline {
                        *st = ReplyState::Idle;
                        return Err(Error::Timeout);
                    }
                    let (guard, _) = self.done.wait_timeout(st, deadline - now).unwrap();
                    st = guard;
                }
                ReplyState::Idle => return Err(Error::Timeout),
            }
        }
    }

    /// Called from the RX completion context with a non-notification
    /// command-response record (header included, `buf.len() >= 4`).
    ///
    /// Validates the echoed header against the armed command before
    /// completing; a mismatch is dropped silently so the command times out
    /// instead of completing with corrupt data.
    fn complete(&self, buf: &[u8]) {
        let mut st = self.state.lock().unwrap();

        let (echo, expect) = match *st {
            ReplyState::Armed { echo, expect } => (echo, expect),
            _ => {
                debug!("unsolicited command response, ignoring");
                return;
            }
        };

        let in_hdr = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);

        // Rebuild the header we expect the device to echo: the outbound
        // header with the length byte replaced by the response length.
        let mut out = echo & !0xff;
        match expect {
            Some(n) => out |= n as u32,
            None => out |= in_hdr & 0xff,
        }

        if out != in_hdr {
            warn!("invalid response header {in_hdr:#010x}, expected {out:#010x}: {buf:02x?}");
            return;
        }

        let rlen = match expect {
            Some(n) => n,
            None => (in_hdr & 0xff) as usize,
        };
        let Some(payload) = buf.get(4..4 + rlen) else {
            warn!("response record shorter than its header claims: {buf:02x?}");
            return;
        };

        let mut resp = Response::new();
        if resp.extend_from_slice(payload).is_err() {
            warn!("response payload exceeds buffer: {rlen} bytes");
            return;
        }

        *st = ReplyState::Done(resp);
        self.done.notify_one();
    }
}

/// Dispatch one command-response record from the RX stream: either an
/// asynchronous notification or the reply to the pending command.
pub(crate) fn dispatch_response(
    reply: &PendingReply,
    buf: &[u8],
    ap_role: bool,
    events: &impl EventSink,
) {
    let kind = buf[1];
    if kind & NOTIFICATION_MASK != NOTIFICATION_MASK {
        reply.complete(buf);
        return;
    }

    match kind {
        NOTIFY_TX_STATUS => {
            // Layout: 0c c1 .. .. M1..M6 R4 R3 R2 R1 S2 S1.
            if buf.len() < 16 {
                debug!("short tx status record: {buf:02x?}");
                return;
            }
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&buf[4..10]);
            let status = TxStatus {
                mac,
                rate: u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]),
                status: u16::from_be_bytes([buf[14], buf[15]]),
            };
            events.tx_status(status);
        }
        NOTIFY_TBTT => {
            // Beacon regeneration only matters when we are the one
            // beaconing.
            if ap_role {
                events.beacon_trigger();
            }
        }
        _ => {}
    }
}

// ── Tests ────────────────────────────────────────────────────
