//! A simulated lossy, latent link for driving two `ControlBlock`s against
//! each other without a real socket. Mirrors the embedder harness in
//! `demos/`, but deterministic and under our own virtual clock so tests
//! don't depend on wall-clock timing.

use std::cell::RefCell;
use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rkcp::ControlBlock;

/// One direction of a link: datagrams dropped with probability `loss_pct`,
/// the rest delayed by a uniform `[latency_min, latency_max]` millisecond jitter.
pub struct Tunnel {
    loss_pct: u8,
    latency_min: u32,
    latency_max: u32,
    rng: StdRng,
    pending: BinaryHeap<Reverse<(u32, Vec<u8>)>>,
    send_count: usize,
    explicit_drops: Vec<usize>,
}

impl Tunnel {
    pub fn new(seed: u64, loss_pct: u8, latency_min: u32, latency_max: u32) -> Self {
        Tunnel {
            loss_pct,
            latency_min,
            latency_max,
            rng: StdRng::seed_from_u64(seed),
            pending: BinaryHeap::new(),
            send_count: 0,
            explicit_drops: Vec::new(),
        }
    }

    /// Drops the datagrams at these 0-indexed send-call positions, on top of
    /// whatever `loss_pct` would otherwise do. Used to force a specific
    /// segment missing without relying on RNG luck.
    pub fn with_explicit_drops(mut self, drops: Vec<usize>) -> Self {
        self.explicit_drops = drops;
        self
    }

    pub fn send(&mut self, now: u32, data: &[u8]) {
        let index = self.send_count;
        self.send_count += 1;

        if self.explicit_drops.contains(&index) {
            return;
        }
        if self.loss_pct > 0 && self.rng.gen_range(0..100) < self.loss_pct as u32 {
            return;
        }
        let jitter = if self.latency_max > self.latency_min {
            self.rng.gen_range(self.latency_min..self.latency_max)
        } else {
            self.latency_min
        };
        self.pending.push(Reverse((now + jitter, data.to_vec())));
    }

    pub fn drain_ready(&mut self, now: u32) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(Reverse((deliver_at, _))) = self.pending.peek() {
            if *deliver_at > now {
                break;
            }
            let Reverse((_, data)) = self.pending.pop().unwrap();
            out.push(data);
        }
        out
    }
}

/// Wires `cb`'s output into `tunnel`, tagged with the virtual clock cell so
/// the closure can time-stamp outgoing datagrams without capturing `cb`.
pub fn wire(cb: &mut ControlBlock, tunnel: Rc<RefCell<Tunnel>>, clock: Rc<RefCell<u32>>) {
    cb.set_output(move |data| {
        let now = *clock.borrow();
        tunnel.borrow_mut().send(now, data);
    });
}

/// Advances both sides' clocks in `step`-sized increments, pumping `a_link`
/// (a's outbound tunnel, delivered into `b`) and `b_link` symmetrically,
/// until `done` returns true or `max_ticks` steps elapse. Returns the
/// virtual time at which it stopped.
pub fn pump(
    a: &mut ControlBlock,
    b: &mut ControlBlock,
    a_clock: &Rc<RefCell<u32>>,
    b_clock: &Rc<RefCell<u32>>,
    a_to_b: &Rc<RefCell<Tunnel>>,
    b_to_a: &Rc<RefCell<Tunnel>>,
    step: u32,
    max_ticks: u32,
    mut done: impl FnMut(&mut ControlBlock, &mut ControlBlock) -> bool,
) -> u32 {
    let mut now = 0u32;
    for _ in 0..max_ticks {
        *a_clock.borrow_mut() = now;
        *b_clock.borrow_mut() = now;

        a.update(now);
        b.update(now);

        for dgram in a_to_b.borrow_mut().drain_ready(now) {
            let _ = b.input(&dgram);
        }
        for dgram in b_to_a.borrow_mut().drain_ready(now) {
            let _ = a.input(&dgram);
        }

        if done(a, b) {
            return now;
        }

        now += step;
    }
    now
}
