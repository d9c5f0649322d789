use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use log::{debug, trace};

use crate::config::{
    Config, NoDelay, ASK_SEND, ASK_TELL, OVERHEAD, PROBE_INIT, PROBE_LIMIT, RTO_DEF, RTO_MAX,
    THRESH_INIT, THRESH_MIN,
};
use crate::error::{Error, Result};
use crate::segment::{Segment, CMD_ACK, CMD_PUSH, CMD_WASK, CMD_WINS};
use crate::seq;

type OutputFn = dyn FnMut(&[u8]) + 'static;

/// Per-connection ARQ state. One `ControlBlock` handles exactly one peer,
/// identified by `conv`; an embedder juggling several peers keeps one of
/// these per conversation and demultiplexes inbound datagrams to the right
/// one with [`crate::segment::peek_conv`].
///
/// All methods are `&mut self` and none of them block or spawn; the caller
/// is responsible for serializing access (see the crate's concurrency
/// notes) and for supplying a wall clock via [`ControlBlock::update`].
pub struct ControlBlock {
    conv: u32,
    user: u64,

    mtu: usize,
    mss: usize,

    state: u32,

    snd_una: u32,
    snd_nxt: u32,
    rcv_nxt: u32,

    ssthresh: u32,

    rx_rttval: u32,
    rx_srtt: u32,
    rx_rto: u32,
    rx_minrto: u32,

    snd_wnd: u16,
    rcv_wnd: u16,
    rmt_wnd: u16,
    cwnd: u32,
    incr: usize,

    probe: u32,

    current: u32,
    interval: u32,
    ts_flush: u32,
    xmit: u32,

    nodelay: NoDelay,
    updated: bool,

    ts_probe: u32,
    probe_wait: u32,

    dead_link: u32,
    fastresend: u32,
    fastlimit: u32,
    nocwnd: bool,
    stream: bool,

    snd_queue: VecDeque<Segment>,
    rcv_queue: VecDeque<Segment>,
    snd_buf: VecDeque<Segment>,
    rcv_buf: VecDeque<Segment>,

    acklist: VecDeque<(u32, u32)>,
    buffer: BytesMut,

    output: Option<Box<OutputFn>>,
}

impl ControlBlock {
    pub fn new(conv: u32, user: u64) -> Self {
        Self::with_config(conv, user, Config::default())
    }

    pub fn with_config(conv: u32, user: u64, config: Config) -> Self {
        let mtu = config.mtu;
        let mss = mtu - OVERHEAD;

        ControlBlock {
            conv,
            user,

            mtu,
            mss,

            state: 0,

            snd_una: 0,
            snd_nxt: 0,
            rcv_nxt: 0,

            ssthresh: THRESH_INIT,

            rx_rttval: 0,
            rx_srtt: 0,
            rx_rto: RTO_DEF,
            rx_minrto: config.nodelay.min_rto(),

            snd_wnd: config.snd_wnd,
            rcv_wnd: config.rcv_wnd.max(crate::config::WND_RCV_DEFAULT),
            rmt_wnd: crate::config::WND_RCV_DEFAULT,
            cwnd: 0,
            incr: 0,

            probe: 0,

            current: 0,
            interval: config.interval.clamp(
                crate::config::INTERVAL_MIN,
                crate::config::INTERVAL_MAX,
            ),
            ts_flush: crate::config::INTERVAL_DEFAULT,
            xmit: 0,

            nodelay: config.nodelay,
            updated: false,

            ts_probe: 0,
            probe_wait: 0,

            dead_link: config.dead_link,
            fastresend: config.fastresend,
            fastlimit: config.fastlimit,
            nocwnd: config.nocwnd,
            stream: config.stream,

            snd_queue: VecDeque::new(),
            rcv_queue: VecDeque::new(),
            snd_buf: VecDeque::new(),
            rcv_buf: VecDeque::new(),

            acklist: VecDeque::new(),
            buffer: BytesMut::with_capacity((mtu + OVERHEAD) * 3),

            output: None,
        }
    }

    pub fn conv(&self) -> u32 {
        self.conv
    }

    pub fn user(&self) -> u64 {
        self.user
    }

    /// Registers the callback that transmits one already-framed datagram.
    /// Invoked synchronously, and only from inside [`ControlBlock::flush`].
    pub fn set_output(&mut self, f: impl FnMut(&[u8]) + 'static) {
        self.output = Some(Box::new(f));
    }

    pub fn is_dead_link(&self) -> bool {
        self.state != 0
    }

    /// Number of segments still in `snd_queue` or `snd_buf`.
    pub fn waitsnd(&self) -> usize {
        self.snd_buf.len() + self.snd_queue.len()
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn mss(&self) -> usize {
        self.mss
    }

    pub fn set_mtu(&mut self, mtu: usize) -> Result<()> {
        if mtu < 50 || mtu < OVERHEAD {
            return Err(Error::InvalidMtu { mtu });
        }
        self.mtu = mtu;
        self.mss = mtu - OVERHEAD;
        let target = (mtu + OVERHEAD) * 3;
        if target > self.buffer.capacity() {
            self.buffer.reserve(target - self.buffer.capacity());
        }
        Ok(())
    }

    pub fn set_interval(&mut self, interval: u32) {
        self.interval = interval.clamp(crate::config::INTERVAL_MIN, crate::config::INTERVAL_MAX);
    }

    /// `interval`/`resend` of `None` mean "leave unchanged", matching the
    /// "negative argument" convention of the C-flavored API this mirrors.
    pub fn set_nodelay(
        &mut self,
        nodelay: NoDelay,
        interval: Option<u32>,
        resend: Option<u32>,
        nocwnd: bool,
    ) {
        self.nodelay = nodelay;
        self.rx_minrto = nodelay.min_rto();
        if let Some(interval) = interval {
            self.set_interval(interval);
        }
        if let Some(resend) = resend {
            self.fastresend = resend;
        }
        self.nocwnd = nocwnd;
    }

    pub fn set_wndsize(&mut self, snd: Option<u16>, rcv: Option<u16>) {
        if let Some(snd) = snd {
            if snd > 0 {
                self.snd_wnd = snd;
            }
        }
        if let Some(rcv) = rcv {
            if rcv > 0 {
                self.rcv_wnd = rcv.max(crate::config::WND_RCV_DEFAULT);
            }
        }
    }

    pub fn set_fastlimit(&mut self, fastlimit: u32) {
        self.fastlimit = fastlimit;
    }

    pub fn set_dead_link(&mut self, dead_link: u32) {
        self.dead_link = dead_link;
    }

    // ---- send path (§4.2) ------------------------------------------------

    pub fn send(&mut self, mut payload: &[u8]) -> Result<()> {
        if self.stream {
            if let Some(tail) = self.snd_queue.back_mut() {
                let tail_len = tail.data.len();
                if tail_len < self.mss {
                    let capacity = self.mss - tail_len;
                    let extend = payload.len().min(capacity);
                    let mut combined = BytesMut::from(tail.data.as_ref());
                    combined.extend_from_slice(&payload[..extend]);
                    tail.data = combined.freeze();
                    tail.frg = 0;
                    payload = &payload[extend..];
                }
            }
            if payload.is_empty() {
                return Ok(());
            }
        }

        let count = if payload.is_empty() {
            1
        } else {
            (payload.len() + self.mss - 1) / self.mss
        };

        if count >= self.rcv_wnd as usize {
            return Err(Error::MessageTooLarge {
                fragments: count,
                rcv_wnd: self.rcv_wnd,
            });
        }

        for i in 0..count {
            let size = self.mss.min(payload.len());
            let (chunk, rest) = payload.split_at(size);
            payload = rest;

            let frg = if self.stream { 0 } else { (count - i - 1) as u8 };
            let mut seg = Segment::with_data(Bytes::copy_from_slice(chunk));
            seg.frg = frg;
            self.snd_queue.push_back(seg);
        }

        Ok(())
    }

    // ---- receive path (§4.3) ---------------------------------------------

    pub fn peeksize(&self) -> Result<usize> {
        let first = self.rcv_queue.front().ok_or(Error::RecvQueueEmpty)?;

        if first.frg == 0 {
            return Ok(first.data.len());
        }

        if self.rcv_queue.len() < first.frg as usize + 1 {
            return Err(Error::IncompleteMessage);
        }

        let mut len = 0;
        for seg in &self.rcv_queue {
            len += seg.data.len();
            if seg.frg == 0 {
                break;
            }
        }
        Ok(len)
    }

    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.rcv_queue.is_empty() {
            return Err(Error::RecvQueueEmpty);
        }

        let peeksize = self.peeksize()?;
        if peeksize > buf.len() {
            return Err(Error::BufferTooSmall {
                needed: peeksize,
                available: buf.len(),
            });
        }

        let recover = self.rcv_queue.len() >= self.rcv_wnd as usize;

        let mut written = 0;
        while let Some(seg) = self.rcv_queue.pop_front() {
            buf[written..written + seg.data.len()].copy_from_slice(&seg.data);
            written += seg.data.len();
            trace!("recv sn={}", seg.sn);
            if seg.frg == 0 {
                break;
            }
        }
        debug_assert_eq!(written, peeksize);

        self.move_buf();

        if recover && self.rcv_queue.len() < self.rcv_wnd as usize {
            self.probe |= ASK_TELL;
        }

        Ok(written)
    }

    /// Promote contiguous segments from `rcv_buf` into `rcv_queue`.
    fn move_buf(&mut self) {
        while let Some(front) = self.rcv_buf.front() {
            if front.sn == self.rcv_nxt && self.rcv_queue.len() < self.rcv_wnd as usize {
                let seg = self.rcv_buf.pop_front().unwrap();
                self.rcv_nxt = self.rcv_nxt.wrapping_add(1);
                self.rcv_queue.push_back(seg);
            } else {
                break;
            }
        }
    }

    // ---- datagram input (§4.4-4.6) ----------------------------------------

    pub fn input(&mut self, data: &[u8]) -> Result<()> {
        let old_una = self.snd_una;
        let mut saw_ack = false;
        let mut max_ack = 0u32;
        let mut latest_ts = 0u32;

        let mut cursor: &[u8] = data;
        while let Some(seg) = Segment::decode(&mut cursor)? {
            if seg.conv != self.conv {
                return Err(Error::ConversationMismatch {
                    expected: self.conv,
                    actual: seg.conv,
                });
            }

            self.rmt_wnd = seg.wnd;
            self.parse_una(seg.una);
            self.shrink_buf();

            match seg.cmd {
                CMD_ACK => {
                    let rtt = seq::timediff(self.current, seg.ts);
                    if rtt >= 0 {
                        self.update_ack(rtt as u32);
                    }
                    self.parse_ack(seg.sn);
                    self.shrink_buf();

                    if !saw_ack {
                        saw_ack = true;
                        max_ack = seg.sn;
                        latest_ts = seg.ts;
                    } else if seq::timediff(seg.sn, max_ack) > 0 {
                        if cfg!(feature = "fastack-conserve") {
                            if seq::timediff(seg.ts, latest_ts) > 0 {
                                max_ack = seg.sn;
                                latest_ts = seg.ts;
                            }
                        } else {
                            max_ack = seg.sn;
                            latest_ts = seg.ts;
                        }
                    }

                    trace!("input ack: sn={} rtt={}", seg.sn, rtt);
                }
                CMD_PUSH => {
                    trace!("input push: sn={} ts={}", seg.sn, seg.ts);
                    if seq::lt(seg.sn, self.rcv_nxt.wrapping_add(self.rcv_wnd as u32)) {
                        self.ack_push(seg.sn, seg.ts);
                        if seq::le(self.rcv_nxt, seg.sn) {
                            self.parse_data(seg);
                        }
                    }
                }
                CMD_WASK => {
                    trace!("input probe");
                    self.probe |= ASK_TELL;
                }
                CMD_WINS => {
                    trace!("input wins: wnd={}", seg.wnd);
                }
                cmd => return Err(Error::UnknownCommand { cmd }),
            }
        }

        if saw_ack {
            self.parse_fastack(max_ack, latest_ts);
        }

        if seq::lt(old_una, self.snd_una) {
            self.grow_cwnd();
        }

        Ok(())
    }

    fn ack_push(&mut self, sn: u32, ts: u32) {
        self.acklist.push_back((sn, ts));
    }

    fn parse_una(&mut self, una: u32) {
        while let Some(front) = self.snd_buf.front() {
            if seq::lt(front.sn, una) {
                self.snd_buf.pop_front();
            } else {
                break;
            }
        }
    }

    fn shrink_buf(&mut self) {
        self.snd_una = self.snd_buf.front().map(|s| s.sn).unwrap_or(self.snd_nxt);
    }

    fn parse_ack(&mut self, sn: u32) {
        if seq::lt(sn, self.snd_una) || seq::le(self.snd_nxt, sn) {
            return;
        }

        let mut i = 0;
        while i < self.snd_buf.len() {
            match sn.cmp(&self.snd_buf[i].sn) {
                std::cmp::Ordering::Equal => {
                    self.snd_buf.remove(i);
                    break;
                }
                std::cmp::Ordering::Less => break,
                std::cmp::Ordering::Greater => i += 1,
            }
        }
    }

    fn parse_fastack(&mut self, maxsn: u32, ts: u32) {
        if seq::lt(maxsn, self.snd_una) || seq::le(self.snd_nxt, maxsn) {
            return;
        }

        for seg in self.snd_buf.iter_mut() {
            if seq::lt(maxsn, seg.sn) {
                break;
            }
            if maxsn == seg.sn {
                continue;
            }
            if cfg!(feature = "fastack-conserve") {
                if seq::le(seg.ts, ts) {
                    seg.fastack += 1;
                }
            } else {
                seg.fastack += 1;
            }
        }
    }

    fn parse_data(&mut self, new_seg: Segment) {
        let sn = new_seg.sn;

        let mut repeat = false;
        let mut insert_at = self.rcv_buf.len();

        for seg in self.rcv_buf.iter().rev() {
            if seg.sn == sn {
                repeat = true;
                break;
            }
            if seq::lt(seg.sn, sn) {
                break;
            }
            insert_at -= 1;
        }

        if !repeat {
            self.rcv_buf.insert(insert_at, new_seg);
        }

        self.move_buf();
    }

    // ---- RTT/RTO estimator (§4.7) ------------------------------------------

    fn update_ack(&mut self, rtt: u32) {
        if self.rx_srtt == 0 {
            self.rx_srtt = rtt;
            self.rx_rttval = rtt / 2;
        } else {
            let delta = rtt.abs_diff(self.rx_srtt);
            self.rx_rttval = (3 * self.rx_rttval + delta) / 4;
            self.rx_srtt = (7 * self.rx_srtt + rtt) / 8;
            if self.rx_srtt < 1 {
                self.rx_srtt = 1;
            }
        }
        let rto = self.rx_srtt + self.interval.max(4 * self.rx_rttval);
        self.rx_rto = rto.clamp(self.rx_minrto, RTO_MAX);
    }

    // ---- congestion control (§4.8) -----------------------------------------

    fn grow_cwnd(&mut self) {
        if self.cwnd >= self.rmt_wnd as u32 {
            return;
        }

        let mss = self.mss;
        if self.cwnd < self.ssthresh {
            self.cwnd += 1;
            self.incr += mss;
        } else {
            if self.incr < mss {
                self.incr = mss;
            }
            self.incr += mss * mss / self.incr + mss / 16;
            if (self.cwnd as usize + 1) * mss <= self.incr {
                self.cwnd = ((self.incr + mss - 1) / mss.max(1)) as u32;
            }
        }

        if self.cwnd > self.rmt_wnd as u32 {
            self.cwnd = self.rmt_wnd as u32;
            self.incr = self.rmt_wnd as usize * mss;
        }
    }

    fn wnd_unused(&self) -> u16 {
        if self.rcv_queue.len() < self.rcv_wnd as usize {
            self.rcv_wnd - self.rcv_queue.len() as u16
        } else {
            0
        }
    }

    // ---- clock driver (§4.10) ----------------------------------------------

    pub fn update(&mut self, current: u32) {
        self.current = current;

        if !self.updated {
            self.updated = true;
            self.ts_flush = current;
        }

        let mut slap = seq::timediff(current, self.ts_flush);
        if !(-10_000..10_000).contains(&slap) {
            self.ts_flush = current;
            slap = 0;
        }

        if slap >= 0 {
            self.ts_flush = self.ts_flush.wrapping_add(self.interval);
            if seq::le(self.ts_flush, current) {
                self.ts_flush = current.wrapping_add(self.interval);
            }
            self.flush_inner();
        }
    }

    /// The earliest timestamp at which `update` must next run. Callers may
    /// sleep until this time rather than polling `update` on a fixed tick.
    pub fn check(&self, current: u32) -> u32 {
        if !self.updated {
            return current;
        }

        let mut ts_flush = self.ts_flush;
        if !(-10_000..10_000).contains(&seq::timediff(current, ts_flush)) {
            ts_flush = current;
        }
        if seq::le(ts_flush, current) {
            return current;
        }

        let tm_flush = seq::timediff(ts_flush, current) as u32;
        let mut tm_packet = u32::MAX;
        for seg in &self.snd_buf {
            let diff = seq::timediff(seg.resendts, current);
            if diff <= 0 {
                return current;
            }
            tm_packet = tm_packet.min(diff as u32);
        }

        let minimal = tm_packet.min(tm_flush).min(self.interval);
        current.wrapping_add(minimal)
    }

    // ---- flush/scheduler (§4.9) --------------------------------------------

    pub fn flush(&mut self) -> Result<()> {
        if !self.updated {
            return Err(Error::NotYetUpdated);
        }
        self.flush_inner();
        Ok(())
    }

    fn flush_inner(&mut self) {
        let wnd = self.wnd_unused();

        // 1. pending ACKs.
        if !self.acklist.is_empty() {
            let mut ack_seg = Segment {
                conv: self.conv,
                cmd: CMD_ACK,
                wnd,
                una: self.rcv_nxt,
                ..Default::default()
            };
            for (sn, ts) in self.acklist.drain(..) {
                if self.buffer.len() + OVERHEAD > self.mtu {
                    self.emit();
                }
                ack_seg.sn = sn;
                ack_seg.ts = ts;
                ack_seg.encode(&mut self.buffer);
            }
        }

        // 2. zero-window probing.
        self.probe_wnd_size();

        // 3. probe/advertise commands.
        if self.probe & ASK_SEND != 0 {
            self.flush_probe(CMD_WASK, wnd);
        }
        if self.probe & ASK_TELL != 0 {
            self.flush_probe(CMD_WINS, wnd);
        }
        self.probe = 0;

        // 4. promote snd_queue -> snd_buf under the effective window.
        let mut cwnd = self.snd_wnd.min(self.rmt_wnd);
        if !self.nocwnd {
            cwnd = cwnd.min(self.cwnd.min(u16::MAX as u32) as u16);
        }

        while seq::lt(self.snd_nxt, self.snd_una.wrapping_add(cwnd as u32)) {
            let Some(mut seg) = self.snd_queue.pop_front() else {
                break;
            };
            seg.conv = self.conv;
            seg.cmd = CMD_PUSH;
            seg.wnd = wnd;
            seg.ts = self.current;
            seg.sn = self.snd_nxt;
            self.snd_nxt = self.snd_nxt.wrapping_add(1);
            seg.una = self.rcv_nxt;
            seg.resendts = self.current;
            seg.rto = self.rx_rto;
            seg.fastack = 0;
            seg.xmit = 0;
            self.snd_buf.push_back(seg);
        }

        // 5. walk snd_buf deciding what to (re)transmit.
        let resent = if self.fastresend > 0 {
            self.fastresend
        } else {
            u32::MAX
        };
        let rtomin = if !self.nodelay.is_enabled() {
            self.rx_rto >> 3
        } else {
            0
        };

        let mut lost = false;
        let mut change = 0u32;

        let current = self.current;
        let rcv_nxt = self.rcv_nxt;
        let dead_link = self.dead_link;
        let mut went_dead = false;

        for i in 0..self.snd_buf.len() {
            let mut need_send = false;

            {
                let seg = &mut self.snd_buf[i];
                if seg.xmit == 0 {
                    need_send = true;
                    seg.xmit += 1;
                    seg.rto = self.rx_rto;
                    seg.resendts = current + seg.rto + rtomin;
                } else if seq::le(seg.resendts, current) {
                    need_send = true;
                    seg.xmit += 1;
                    self.xmit += 1;
                    match self.nodelay {
                        NoDelay::Off => seg.rto += seg.rto.max(self.rx_rto),
                        NoDelay::On => seg.rto += seg.rto / 2,
                        NoDelay::Aggressive => seg.rto += self.rx_rto / 2,
                    }
                    seg.resendts = current + seg.rto;
                    lost = true;
                    debug!(
                        "timeout retransmit: sn={} xmit={} rto={}",
                        seg.sn, seg.xmit, seg.rto
                    );
                } else if seg.fastack >= resent
                    && (seg.xmit <= self.fastlimit || self.fastlimit == 0)
                {
                    need_send = true;
                    seg.xmit += 1;
                    seg.fastack = 0;
                    seg.resendts = current + seg.rto;
                    change += 1;
                    debug!("fast retransmit: sn={}", seg.sn);
                }

                if need_send {
                    seg.ts = current;
                    seg.wnd = wnd;
                    seg.una = rcv_nxt;
                }
            }

            if need_send {
                let need = self.snd_buf[i].encoded_len();
                if self.buffer.len() + need > self.mtu {
                    self.emit();
                }
                let seg = &self.snd_buf[i];
                seg.encode(&mut self.buffer);

                if seg.xmit >= dead_link {
                    went_dead = true;
                }
            }
        }

        if went_dead {
            debug!("dead link: conv={}", self.conv);
            self.state = u32::MAX;
        }

        // 6. flush residual buffer.
        if !self.buffer.is_empty() {
            self.emit();
        }

        // 7. congestion-control loss response.
        if change > 0 {
            let inflight = seq::timediff(self.snd_nxt, self.snd_una).max(0) as u32;
            self.ssthresh = (inflight / 2).max(THRESH_MIN);
            self.cwnd = self.ssthresh + change;
            self.incr = self.cwnd as usize * self.mss;
        }

        if lost {
            self.ssthresh = (cwnd as u32 / 2).max(THRESH_MIN);
            self.cwnd = 1;
            self.incr = self.mss;
        }

        if self.cwnd < 1 {
            self.cwnd = 1;
            self.incr = self.mss;
        }
    }

    fn probe_wnd_size(&mut self) {
        if self.rmt_wnd == 0 {
            if self.probe_wait == 0 {
                self.probe_wait = PROBE_INIT;
                self.ts_probe = self.current + self.probe_wait;
            } else if seq::le(self.ts_probe, self.current) {
                if self.probe_wait < PROBE_INIT {
                    self.probe_wait = PROBE_INIT;
                }
                self.probe_wait += self.probe_wait / 2;
                if self.probe_wait > PROBE_LIMIT {
                    self.probe_wait = PROBE_LIMIT;
                }
                self.ts_probe = self.current + self.probe_wait;
                self.probe |= ASK_SEND;
            }
        } else {
            self.ts_probe = 0;
            self.probe_wait = 0;
        }
    }

    fn flush_probe(&mut self, cmd: u8, wnd: u16) {
        if self.buffer.len() + OVERHEAD > self.mtu {
            self.emit();
        }
        let seg = Segment {
            conv: self.conv,
            cmd,
            wnd,
            una: self.rcv_nxt,
            ts: self.current,
            ..Default::default()
        };
        seg.encode(&mut self.buffer);
    }

    fn emit(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Some(output) = self.output.as_mut() {
            output(&self.buffer);
        }
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn wired_pair(conv: u32) -> (ControlBlock, ControlBlock, Rc<RefCell<Vec<Vec<u8>>>>, Rc<RefCell<Vec<Vec<u8>>>>) {
        let a_out = Rc::new(RefCell::new(Vec::new()));
        let b_out = Rc::new(RefCell::new(Vec::new()));

        let mut a = ControlBlock::new(conv, 0);
        let mut b = ControlBlock::new(conv, 0);

        let a_out_clone = a_out.clone();
        a.set_output(move |data| a_out_clone.borrow_mut().push(data.to_vec()));
        let b_out_clone = b_out.clone();
        b.set_output(move |data| b_out_clone.borrow_mut().push(data.to_vec()));

        (a, b, a_out, b_out)
    }

    #[test]
    fn send_recv_single_segment() {
        let (mut a, mut b, a_out, _b_out) = wired_pair(1);
        a.update(0);
        b.update(0);

        a.send(b"hello").unwrap();
        a.update(0);

        for dgram in a_out.borrow_mut().drain(..) {
            b.input(&dgram).unwrap();
        }

        let mut buf = [0u8; 64];
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn message_fragmentation_and_reassembly() {
        let (mut a, mut b, a_out, b_out) = wired_pair(7);
        a.update(0);
        b.update(0);

        a.set_mtu(50).unwrap();
        let payload = vec![0xABu8; 300];
        a.send(&payload).unwrap();

        for t in (0..2000).step_by(10) {
            a.update(t);
            for dgram in a_out.borrow_mut().drain(..) {
                b.input(&dgram).unwrap();
            }
            b.update(t);
            for dgram in b_out.borrow_mut().drain(..) {
                a.input(&dgram).unwrap();
            }
            if b.peeksize().is_ok() {
                break;
            }
        }

        let mut buf = [0u8; 512];
        let n = b.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], payload.as_slice());
    }

    #[test]
    fn send_rejects_oversized_message() {
        let mut a = ControlBlock::new(1, 0);
        let too_big = vec![0u8; a.mss * (a.rcv_wnd as usize + 5)];
        let err = a.send(&too_big).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { .. }));
    }

    #[test]
    fn recv_on_empty_queue_errors() {
        let mut a = ControlBlock::new(1, 0);
        let mut buf = [0u8; 16];
        assert!(matches!(a.recv(&mut buf), Err(Error::RecvQueueEmpty)));
    }

    #[test]
    fn flush_before_update_errors() {
        let mut a = ControlBlock::new(1, 0);
        assert!(matches!(a.flush(), Err(Error::NotYetUpdated)));
    }

    #[test]
    fn conversation_mismatch_rejected() {
        let mut a = ControlBlock::new(1, 0);
        let mut b = ControlBlock::new(2, 0);
        a.update(0);
        b.update(0);

        a.send(b"hi").unwrap();
        a.update(0);

        let out = Rc::new(RefCell::new(Vec::new()));
        let out_clone = out.clone();
        a.set_output(move |d| out_clone.borrow_mut().push(d.to_vec()));
        a.send(b"again").unwrap();
        a.flush().unwrap();

        for dgram in out.borrow_mut().drain(..) {
            assert!(matches!(
                b.input(&dgram),
                Err(Error::ConversationMismatch { .. })
            ));
        }
    }

    #[test]
    fn cwnd_never_drops_below_one_after_first_flush() {
        let mut a = ControlBlock::new(1, 0);
        a.update(0);
        assert!(a.cwnd >= 1);
    }

    #[test]
    fn stream_mode_coalesces_small_sends() {
        let mut a = ControlBlock::with_config(
            1,
            0,
            Config {
                stream: true,
                ..Config::default()
            },
        );

        for _ in 0..5 {
            a.send(&[1u8; 100]).unwrap();
        }

        assert_eq!(a.snd_queue.len(), 1);
        assert_eq!(a.snd_queue.front().unwrap().data.len(), 500);
    }

    #[test]
    fn zero_length_message_mode_send_appends_one_segment() {
        let mut a = ControlBlock::new(1, 0);
        a.send(&[]).unwrap();
        assert_eq!(a.snd_queue.len(), 1);
        assert_eq!(a.snd_queue.front().unwrap().frg, 0);
        assert_eq!(a.snd_queue.front().unwrap().data.len(), 0);
    }

    #[test]
    fn waitsnd_counts_both_queues() {
        let mut a = ControlBlock::new(1, 0);
        a.send(b"one").unwrap();
        a.send(b"two").unwrap();
        assert_eq!(a.waitsnd(), 2);
    }
}
