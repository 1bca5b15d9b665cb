//! Device session: one attached device, one command channel, one RX
//! demultiplexer, and the soft state the driver mirrors into hardware.
//!
//! Locking model:
//! - the session lock (`lock()`) serializes command *issuance* only. It is
//!   never taken on the RX path, because RX completion must be able to run
//!   while a command's timeout is expiring.
//! - the pending-reply slot has its own short lock (see [`crate::cmd`]).
//! - "current" filter state is mutated only by the lock holder; the
//!   asynchronous side records "desired" state under a separate small lock
//!   and the lock holder commits it with [`DeviceGuard::sync_filters`].
//!
//! RX buffers are a fixed pool of slots the transport keeps perpetually
//! armed; completion hands each buffer here, and the slot is rearmed
//! unless the device died or the session is tearing down. `shutdown()`
//! cancels every armed slot and blocks until the transport acknowledges.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};

use crate::cmd::{self, CMD_TIMEOUT, PendingReply, Response};
use crate::error::{Error, Result, TransportError};
use crate::fw;
use crate::mpdu::{self, RadioInfo};
use crate::ports::{EventSink, FirmwareSource, FrameSink};
use crate::regbatch::RegWriter;
use crate::rx::{StreamParser, StreamRecord};
use crate::transport::Transport;
use crate::wire::{self, Band, Cmd, FrameFilter};

/// Size of the long-lived RX buffer pool.
pub const NUM_RX_SLOTS: usize = 16;

/// Pattern used for the post-upload echo self-test.
const ECHO_TEST_PATTERN: u32 = 0x5aa5_5aa5;

bitflags::bitflags! {
    /// Receive-filter behavior requested by the upper layer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FilterRequest: u32 {
        /// Accept all multicast frames.
        const ALLMULTI = 1 << 0;
        /// Accept control frames (PS-Poll, RTS/CTS, ACK, CF-End).
        const CONTROL  = 1 << 1;
    }
}

/// Key algorithms installable into the hardware key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlg {
    Wep40,
    Wep104,
    Tkip,
    Ccmp,
}

impl KeyAlg {
    fn ktype(self) -> u8 {
        match self {
            Self::Wep40 => wire::ENC_ALG_WEP64,
            Self::Wep104 => wire::ENC_ALG_WEP128,
            Self::Tkip => wire::ENC_ALG_TKIP,
            Self::Ccmp => wire::ENC_ALG_AESCCMP,
        }
    }
}

/// Soft state owned by the command-issuing side.
struct SoftState {
    usedkeys: u64,
    cur_filter: FrameFilter,
    cur_mc_hash: u64,
}

/// Desired filter state, written by the asynchronous side.
struct WantedFilters {
    filter: FrameFilter,
    mc_hash: u64,
}

struct RadioState {
    band: Band,
    freq_mhz: u32,
    ap_role: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxSlot {
    Idle,
    Armed,
    /// The device died on this slot; never rearmed.
    Dead,
}

/// One attached device.
pub struct Session<T: Transport> {
    transport: T,
    reply: PendingReply,
    ctl: Mutex<SoftState>,
    radio: Mutex<RadioState>,
    wanted: Mutex<WantedFilters>,
    rx_slots: Mutex<[RxSlot; NUM_RX_SLOTS]>,
    shutdown: AtomicBool,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            reply: PendingReply::new(),
            ctl: Mutex::new(SoftState {
                usedkeys: 0,
                cur_filter: FrameFilter::empty(),
                cur_mc_hash: 0,
            }),
            // Every unit supports 2.4 GHz; default to channel 1 there.
            radio: Mutex::new(RadioState {
                band: Band::Ghz2,
                freq_mhz: 2412,
                ap_role: false,
            }),
            wanted: Mutex::new(WantedFilters {
                filter: FrameFilter::empty(),
                mc_hash: 0,
            }),
            rx_slots: Mutex::new([RxSlot::Idle; NUM_RX_SLOTS]),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Arm the whole RX buffer pool.
    pub fn start(&self) -> Result<()> {
        let mut slots = self.rx_slots.lock().unwrap();
        for (i, slot) in slots.iter_mut().enumerate() {
            if let Err(e) = self.transport.submit_rx(i) {
                warn!("submit RX slot {i} failed: {e}");
                for (j, s) in slots.iter_mut().enumerate().take(i) {
                    self.transport.cancel_rx(j);
                    *s = RxSlot::Idle;
                }
                return Err(Error::Transport(e));
            }
            *slot = RxSlot::Armed;
        }
        Ok(())
    }

    /// Tear the session down: refuse further commands and synchronously
    /// cancel every armed RX buffer. After return no completion will touch
    /// the pool again.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reply.disarm();
        let mut slots = self.rx_slots.lock().unwrap();
        for (i, slot) in slots.iter_mut().enumerate() {
            if *slot == RxSlot::Armed {
                self.transport.cancel_rx(i);
            }
            *slot = RxSlot::Idle;
        }
    }

    /// Take the exclusive command-issuance lock.
    pub fn lock(&self) -> DeviceGuard<'_, T> {
        DeviceGuard {
            session: self,
            ctl: self.ctl.lock().unwrap(),
        }
    }

    /// Update the radio facts RX metadata is stamped with.
    pub fn set_channel(&self, band: Band, freq_mhz: u32) {
        let mut radio = self.radio.lock().unwrap();
        radio.band = band;
        radio.freq_mhz = freq_mhz;
    }

    /// Mark the session as beaconing (AP role); gates beacon triggers.
    pub fn set_ap_role(&self, ap_role: bool) {
        self.radio.lock().unwrap().ap_role = ap_role;
    }

    /// Record the upper layer's desired receive filter configuration.
    ///
    /// Called from any context; nothing is written to hardware until the
    /// lock holder runs [`DeviceGuard::sync_filters`].
    pub fn request_filter_update(&self, request: FilterRequest, mc_addrs: &[[u8; 6]]) {
        let mc_hash = if request.contains(FilterRequest::ALLMULTI) {
            !0u64
        } else {
            // Broadcast is always wanted; then one hash bit per address.
            let mut hash = 1u64 << (0xff >> 2);
            for addr in mc_addrs {
                hash |= 1u64 << (addr[5] >> 2);
            }
            hash
        };

        let mut filter = FrameFilter::DEFAULTS;
        if request.contains(FilterRequest::CONTROL) {
            filter |= FrameFilter::PSPOLL
                | FrameFilter::RTS
                | FrameFilter::CTS
                | FrameFilter::ACK
                | FrameFilter::CFE
                | FrameFilter::CFE_ACK;
        }

        let mut wanted = self.wanted.lock().unwrap();
        wanted.filter = filter;
        wanted.mc_hash = mc_hash;
    }

    // ── RX completion path ───────────────────────────────────

    /// Feed one completed inbound buffer. Runs in the transport's
    /// completion context; must not be called after `shutdown()` returns.
    pub fn rx_completed(
        &self,
        slot: usize,
        outcome: core::result::Result<&[u8], TransportError>,
        frames: &impl FrameSink,
        events: &impl EventSink,
    ) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        match outcome {
            Err(TransportError::Overflow) => {
                // Device died; give up on this buffer for good.
                warn!("rx overflow on slot {slot}, dropping buffer");
                self.kill_slot(slot);
                return;
            }
            Err(e) => {
                debug!("rx slot {slot} completed with {e}, resubmitting");
            }
            Ok(data) => self.demux(data, frames, events),
        }

        self.resubmit(slot);
    }

    fn demux(&self, data: &[u8], frames: &impl FrameSink, events: &impl EventSink) {
        // Device-supplied length; anything beyond the stream buffer bound
        // is garbage and the whole buffer is dropped.
        if data.len() > wire::MAX_RX_BUFFER_SIZE {
            warn!("rx buffer of {} bytes exceeds stream bound", data.len());
            return;
        }

        let (radio_info, ap_role) = {
            let radio = self.radio.lock().unwrap();
            (
                RadioInfo {
                    band: radio.band,
                    freq_mhz: radio.freq_mhz,
                },
                radio.ap_role,
            )
        };

        let mut parser = StreamParser::new(data);
        let mut aborted = false;
        for record in &mut parser {
            match record {
                Ok(StreamRecord::Command(payload)) => {
                    cmd::dispatch_response(&self.reply, payload, ap_role, events);
                }
                Ok(StreamRecord::Data(payload)) => match mpdu::decode(payload, radio_info) {
                    Ok((body, meta)) => frames.deliver(body, &meta),
                    Err(drop) => debug!("mpdu dropped: {drop:?}"),
                },
                Err(e) => {
                    warn!("rx framing error: {e}");
                    aborted = true;
                }
            }
        }

        if !aborted && parser.remaining() != 0 {
            warn!("{} stray bytes at end of rx buffer", parser.remaining());
        }
    }

    fn resubmit(&self, slot: usize) {
        let mut slots = self.rx_slots.lock().unwrap();
        // shutdown() sets the flag before taking this lock; a completion
        // that passed the earlier flag check must not rearm a slot the
        // teardown has already cancelled.
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let Some(state) = slots.get_mut(slot) else {
            warn!("completion for unknown rx slot {slot}");
            return;
        };
        if *state == RxSlot::Dead {
            return;
        }
        match self.transport.submit_rx(slot) {
            Ok(()) => *state = RxSlot::Armed,
            Err(e) => {
                warn!("resubmit of rx slot {slot} failed: {e}");
                *state = RxSlot::Dead;
            }
        }
    }

    fn kill_slot(&self, slot: usize) {
        let mut slots = self.rx_slots.lock().unwrap();
        if let Some(state) = slots.get_mut(slot) {
            *state = RxSlot::Dead;
        }
    }
}

// ── Locked command-side operations ───────────────────────────

/// Exclusive view of the session for issuing commands.
///
/// Holding the guard is what makes the single-flight command protocol
/// sound; every hardware-programming operation lives here.
pub struct DeviceGuard<'a, T: Transport> {
    session: &'a Session<T>,
    ctl: std::sync::MutexGuard<'a, SoftState>,
}

impl<'a, T: Transport> DeviceGuard<'a, T> {
    /// Execute one command: build the buffer, submit it, and wait for the
    /// matching response.
    ///
    /// `expect` is the response payload length when known in advance;
    /// `None` accepts whatever length the device reports.
    pub fn exec_cmd(&mut self, cmd: Cmd, payload: &[u8], expect: Option<usize>) -> Result<Response> {
        if payload.len() > wire::MAX_CMD_PAYLOAD {
            return Err(Error::InvalidArgument);
        }
        if self.session.shutdown.load(Ordering::SeqCst) {
            return Err(Error::Shutdown);
        }

        let header = wire::cmd_header(cmd, payload.len());
        let mut buf = heapless::Vec::<u8, { wire::MAX_CMD_LEN }>::new();
        // Both pushes are bounded by the payload check above.
        let _ = buf.extend_from_slice(&header.to_le_bytes());
        let _ = buf.extend_from_slice(payload);

        // Arm before submitting: the response may beat the submit call's
        // return on a fast transport.
        self.session.reply.arm(header, expect);

        if let Err(e) = self.session.transport.submit_command(&buf) {
            self.session.reply.disarm();
            return Err(Error::Transport(e));
        }

        let resp = self.session.reply.wait(CMD_TIMEOUT)?;

        if let Some(n) = expect {
            if resp.len() != n {
                return Err(Error::SizeMismatch);
            }
        }
        Ok(resp)
    }

    /// Write one 32-bit register.
    pub fn write_reg(&mut self, reg: u32, val: u32) -> Result<()> {
        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&reg.to_le_bytes());
        payload[4..].copy_from_slice(&val.to_le_bytes());
        let err = self.exec_cmd(Cmd::Wreg, &payload, Some(0)).map(|_| ());
        if let Err(e) = err {
            debug!("writing reg {reg:#x} (val {val:#x}) failed: {e}");
            return Err(e);
        }
        Ok(())
    }

    /// Read a batch of registers in one command.
    pub fn read_regs(&mut self, regs: &[u32], out: &mut [u32]) -> Result<()> {
        if regs.is_empty() || regs.len() != out.len() || regs.len() > wire::PAYLOAD_MAX_WORDS {
            return Err(Error::InvalidArgument);
        }

        let mut payload = heapless::Vec::<u8, { wire::MAX_CMD_PAYLOAD }>::new();
        for reg in regs {
            let _ = payload.extend_from_slice(&reg.to_le_bytes());
        }

        let resp = self.exec_cmd(Cmd::Rreg, &payload, Some(4 * regs.len()))?;
        for (i, val) in out.iter_mut().enumerate() {
            let bytes: [u8; 4] = resp[4 * i..4 * i + 4].try_into().unwrap();
            *val = u32::from_le_bytes(bytes);
        }
        Ok(())
    }

    /// Read one 32-bit register.
    pub fn read_reg(&mut self, reg: u32) -> Result<u32> {
        let mut out = [0u32; 1];
        self.read_regs(&[reg], &mut out)?;
        Ok(out[0])
    }

    /// Read a contiguous block of 32-bit words, batching eight per command.
    pub fn read_block(&mut self, start: u32, out: &mut [u32]) -> Result<()> {
        const WORDS_PER_CMD: usize = 8;
        for (i, batch) in out.chunks_mut(WORDS_PER_CMD).enumerate() {
            let base = start + (WORDS_PER_CMD * 4 * i) as u32;
            let mut regs = [0u32; WORDS_PER_CMD];
            for (j, reg) in regs.iter_mut().take(batch.len()).enumerate() {
                *reg = base + 4 * j as u32;
            }
            self.read_regs(&regs[..batch.len()], batch)?;
        }
        Ok(())
    }

    /// Round-trip a value through the firmware.
    pub fn echo_test(&mut self, v: u32) -> Result<()> {
        let resp = self.exec_cmd(Cmd::Echo, &v.to_le_bytes(), Some(4))?;
        let back: [u8; 4] = resp[..4].try_into().unwrap();
        if u32::from_le_bytes(back) != v {
            return Err(Error::EchoMismatch);
        }
        Ok(())
    }

    /// Batch multiple register writes into single commands.
    pub fn reg_writer<'w>(&'w mut self) -> RegWriter<'w, 'a, T> {
        RegWriter::new(self)
    }

    // ── Key table ────────────────────────────────────────────

    /// Program one key slot. `mac` of `None` means the all-ones broadcast
    /// address (group keys).
    pub fn upload_key(
        &mut self,
        id: u8,
        mac: Option<&[u8; 6]>,
        ktype: u8,
        keyidx: u8,
        keydata: &[u8],
    ) -> Result<()> {
        const BCAST: [u8; 6] = [0xff; 6];
        let mac = mac.unwrap_or(&BCAST);

        let mut vals = [0u32; 7];
        vals[0] = (u32::from(keyidx) << 16) + u32::from(id);
        vals[1] = u32::from(mac[1]) << 24 | u32::from(mac[0]) << 16 | u32::from(ktype);
        vals[2] = u32::from(mac[5]) << 24
            | u32::from(mac[4]) << 16
            | u32::from(mac[3]) << 8
            | u32::from(mac[2]);

        let mut keybytes = [0u8; 16];
        let n = keydata.len().min(16);
        keybytes[..n].copy_from_slice(&keydata[..n]);
        for (i, word) in keybytes.chunks(4).enumerate() {
            vals[3 + i] = u32::from_le_bytes(word.try_into().unwrap());
        }

        let mut payload = [0u8; 28];
        for (i, v) in vals.iter().enumerate() {
            payload[4 * i..4 * i + 4].copy_from_slice(&v.to_le_bytes());
        }

        self.exec_cmd(Cmd::Ekey, &payload, Some(1)).map(|_| ())
    }

    /// Disable one key slot. Same opcode as install; the firmware tells
    /// the two forms apart by payload length.
    pub fn disable_key(&mut self, id: u8) -> Result<()> {
        self.exec_cmd(Cmd::Ekey, &u32::from(id).to_le_bytes(), Some(1))
            .map(|_| ())
    }

    /// Install a key, allocating a pairwise slot from the used-key bitmap
    /// (group keys live in the fixed slots above 64). Returns the slot.
    pub fn install_key(
        &mut self,
        pairwise: bool,
        group_idx: u8,
        alg: KeyAlg,
        mac: Option<&[u8; 6]>,
        key: &[u8],
    ) -> Result<u8> {
        if alg == KeyAlg::Tkip && key.len() < 32 {
            return Err(Error::InvalidArgument);
        }

        let (slot, mac) = if pairwise {
            let free = (0..64).find(|i| self.ctl.usedkeys & (1 << i) == 0);
            (free.ok_or(Error::KeyTableFull)? as u8, mac)
        } else {
            // Group keys take the all-ones address.
            (64 + group_idx, None)
        };

        self.upload_key(slot, mac, alg.ktype(), 0, &key[..key.len().min(16)])?;
        if alg == KeyAlg::Tkip {
            self.upload_key(slot, mac, alg.ktype(), 1, &key[16..32])?;
        }

        if slot < 64 {
            self.ctl.usedkeys |= 1 << slot;
        }
        self.sync_roll_call()?;
        Ok(slot)
    }

    /// Remove a previously installed key.
    pub fn remove_key(&mut self, slot: u8, alg: KeyAlg) -> Result<()> {
        self.disable_key(slot)?;

        if slot < 64 {
            self.ctl.usedkeys &= !(1 << slot);
        } else {
            self.upload_key(slot, None, wire::ENC_ALG_NONE, 0, &[])?;
            if alg == KeyAlg::Tkip {
                self.upload_key(slot, None, wire::ENC_ALG_NONE, 1, &[])?;
            }
        }
        self.sync_roll_call()
    }

    fn sync_roll_call(&mut self) -> Result<()> {
        let usedkeys = self.ctl.usedkeys;
        let mut batch = self.reg_writer();
        batch.write(wire::MAC_REG_ROLL_CALL_TBL_L, usedkeys as u32);
        batch.write(wire::MAC_REG_ROLL_CALL_TBL_H, (usedkeys >> 32) as u32);
        batch.finish()
    }

    // ── Filter sync ──────────────────────────────────────────

    /// Push the desired filter configuration to the hardware and commit it
    /// as current. Writes only what actually changed.
    pub fn sync_filters(&mut self) -> Result<()> {
        let (want_filter, want_mc_hash) = {
            let wanted = self.session.wanted.lock().unwrap();
            (wanted.filter, wanted.mc_hash)
        };

        let hash_stale = self.ctl.cur_mc_hash != want_mc_hash;
        let filter_stale = self.ctl.cur_filter != want_filter;

        let mut batch = self.reg_writer();
        if hash_stale {
            batch.write(wire::MAC_REG_GROUP_HASH_TBL_H, (want_mc_hash >> 32) as u32);
            batch.write(wire::MAC_REG_GROUP_HASH_TBL_L, want_mc_hash as u32);
        }
        if filter_stale {
            batch.write(wire::MAC_REG_FRAMETYPE_FILTER, want_filter.bits());
        }
        batch.finish()?;

        self.ctl.cur_mc_hash = want_mc_hash;
        self.ctl.cur_filter = want_filter;
        Ok(())
    }

    // ── Bring-up ─────────────────────────────────────────────

    /// Device attach sequence: arm the RX pool, upload both firmware
    /// stages, park the GPIO block (LED lines off), and verify the command
    /// path with an echo.
    ///
    /// The pool must be armed before the first command is issued, since
    /// responses arrive over the stream.
    pub fn bring_up(&mut self, source: &impl FirmwareSource) -> Result<()> {
        self.session.start()?;
        fw::upload(&self.session.transport, source)?;

        // GPIO 0/1 mode: output, 2/3: input; both outputs driven low.
        self.write_reg(wire::GPIO_REG_PORT_TYPE, 3)?;
        self.write_reg(wire::GPIO_REG_PORT_DATA, 0)?;

        self.echo_test(ECHO_TEST_PATTERN)
    }
}

// ── Tests ────────────────────────────────────────────────────
