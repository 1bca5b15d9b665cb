//! Shared harness for integration tests: a scripted in-memory transport
//! plus a responder that answers commands the way the firmware would,
//! feeding replies back through the RX stream path.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use otus::error::TransportError;
use otus::mpdu::RxMeta;
use otus::ports::{EventSink, FrameSink, NullSink, TxStatus};
use otus::session::Session;
use otus::transport::Transport;
use otus::wire;

#[derive(Default)]
pub struct MockState {
    /// Commands not yet answered by the responder.
    pending: VecDeque<Vec<u8>>,
    /// Every command buffer ever submitted.
    pub commands: Vec<Vec<u8>>,
    /// Register file the responder reads and writes.
    pub regs: HashMap<u32, u32>,
    pub submitted_rx: Vec<usize>,
    pub cancelled_rx: Vec<usize>,
    /// Firmware control transfers: (request, value, length).
    pub fw_writes: Vec<(u8, u16, usize)>,
    fw_data_writes: usize,
    /// Fail the next command submission.
    pub fail_submit: bool,
    /// Refuse RX slot submissions.
    pub fail_rx_submit: bool,
    /// Swallow commands instead of answering them.
    pub muted: bool,
    /// Cut this data-bearing firmware write one byte short (0-based).
    pub short_fw_chunk: Option<usize>,
    stopped: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MockState>,
    cv: Condvar,
}

/// Transport double shared between the session under test and the test
/// body. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

impl MockTransport {
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut st = self.shared.state.lock().unwrap();
        let out = f(&mut st);
        drop(st);
        self.shared.cv.notify_all();
        out
    }

    pub fn reg(&self, reg: u32) -> Option<u32> {
        self.with_state(|s| s.regs.get(&reg).copied())
    }

    /// Number of register-write commands issued so far.
    pub fn wreg_count(&self) -> usize {
        self.with_state(|s| s.commands.iter().filter(|c| c[1] == 0x01).count())
    }

    fn stop(&self) {
        self.with_state(|s| s.stopped = true);
    }
}

impl Transport for MockTransport {
    fn submit_command(&self, buf: &[u8]) -> Result<(), TransportError> {
        let mut st = self.shared.state.lock().unwrap();
        if st.fail_submit {
            return Err(TransportError::Other);
        }
        st.commands.push(buf.to_vec());
        st.pending.push_back(buf.to_vec());
        drop(st);
        self.shared.cv.notify_all();
        Ok(())
    }

    fn fw_write(&self, request: u8, value: u16, data: &[u8]) -> Result<usize, TransportError> {
        let mut st = self.shared.state.lock().unwrap();
        st.fw_writes.push((request, value, data.len()));
        if data.is_empty() {
            return Ok(0);
        }
        let idx = st.fw_data_writes;
        st.fw_data_writes += 1;
        if st.short_fw_chunk == Some(idx) {
            return Ok(data.len() - 1);
        }
        Ok(data.len())
    }

    fn submit_rx(&self, slot: usize) -> Result<(), TransportError> {
        let mut st = self.shared.state.lock().unwrap();
        if st.fail_rx_submit {
            return Err(TransportError::Other);
        }
        st.submitted_rx.push(slot);
        Ok(())
    }

    fn cancel_rx(&self, slot: usize) {
        self.shared.state.lock().unwrap().cancelled_rx.push(slot);
    }
}

// ── Responder ────────────────────────────────────────────────

/// Answer pending commands the way the firmware does, until stopped.
fn respond(session: &Session<MockTransport>, mock: &MockTransport) {
    loop {
        let reply = {
            let mut st = mock.shared.state.lock().unwrap();
            let cmd = loop {
                if st.muted {
                    st.pending.clear();
                }
                if let Some(c) = st.pending.pop_front() {
                    break c;
                }
                if st.stopped {
                    return;
                }
                st = mock.shared.cv.wait(st).unwrap();
            };

            let hdr = u32::from_le_bytes([cmd[0], cmd[1], cmd[2], cmd[3]]);
            let payload = &cmd[4..];
            let resp: Vec<u8> = match cmd[1] {
                // RREG: unknown registers read back their own address.
                0x00 => payload
                    .chunks(4)
                    .flat_map(|c| {
                        let reg = u32::from_le_bytes(c.try_into().unwrap());
                        st.regs.get(&reg).copied().unwrap_or(reg).to_le_bytes()
                    })
                    .collect(),
                0x01 => {
                    for pair in payload.chunks(8) {
                        let reg = u32::from_le_bytes(pair[..4].try_into().unwrap());
                        let val = u32::from_le_bytes(pair[4..].try_into().unwrap());
                        st.regs.insert(reg, val);
                    }
                    Vec::new()
                }
                0x28 => vec![0],
                0x80 => payload.to_vec(),
                _ => Vec::new(),
            };

            let out_hdr = (hdr & !0xff) | resp.len() as u32;
            response_chunk(out_hdr, &resp)
        };

        session.rx_completed(0, Ok(&reply), &NullSink, &NullSink);
    }
}

/// Run a test body against a session backed by a live responder.
pub fn with_session<R>(f: impl FnOnce(&Session<MockTransport>, &MockTransport) -> R) -> R {
    let _ = env_logger::builder().is_test(true).try_init();
    let mock = MockTransport::default();
    let session = Session::new(mock.clone());
    std::thread::scope(|s| {
        s.spawn(|| respond(&session, &mock));
        let out = f(&session, &mock);
        mock.stop();
        out
    })
}

// ── Stream buffer builders ───────────────────────────────────

/// Wrap a record payload into one stream chunk.
pub fn chunk(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.push(0);
    out.push(wire::STREAM_SENTINEL);
    out.extend_from_slice(payload);
    out.resize(4 + wire::round_up4(payload.len()), 0);
    out
}

/// Build a command-response chunk: full filler run, header, payload.
pub fn response_chunk(hdr: u32, payload: &[u8]) -> Vec<u8> {
    let mut record = vec![0xff; wire::MAX_FILLER_LEN];
    record.extend_from_slice(&hdr.to_le_bytes());
    record.extend_from_slice(payload);
    chunk(&record)
}

/// Build a data chunk carrying one CCK MPDU at 1 Mbit (PLCP rate 0x0a).
pub fn mpdu_chunk(body: &[u8]) -> Vec<u8> {
    let mut record = vec![0u8; wire::RX_HEAD_LEN];
    record[0] = 0x0a;
    record.extend_from_slice(body);
    let mut tail = [0u8; wire::RX_TAIL_LEN];
    tail[0] = 0x20; // antenna 0 rssi
    tail[1] = 0x80; // antennas 1/2 silent
    tail[2] = 0x80;
    tail[6] = 0x30; // combined rssi
    record.extend_from_slice(&tail);
    chunk(&record)
}

// ── Collecting sinks ─────────────────────────────────────────

#[derive(Default)]
pub struct CollectFrames {
    pub frames: Mutex<Vec<(Vec<u8>, RxMeta)>>,
}

impl FrameSink for CollectFrames {
    fn deliver(&self, frame: &[u8], meta: &RxMeta) {
        self.frames.lock().unwrap().push((frame.to_vec(), *meta));
    }
}

#[derive(Default)]
pub struct CollectEvents {
    pub beacons: AtomicUsize,
    pub tx_statuses: Mutex<Vec<TxStatus>>,
}

impl EventSink for CollectEvents {
    fn tx_status(&self, status: TxStatus) {
        self.tx_statuses.lock().unwrap().push(status);
    }

    fn beacon_trigger(&self) {
        self.beacons.fetch_add(1, Ordering::Relaxed);
    }
}
