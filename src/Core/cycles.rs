// Cycle accounting for the socket entry points. Observational only.

use crossbeam_utils::CachePadded;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicU64, Ordering};

/// Entry points that are metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Open,
    Send,
    Receive,
}

/// Read the hardware cycle counter.
///
/// `rdcycle` on RISC-V, `rdtsc` on x86_64, nanoseconds since first use elsewhere.
#[inline]
pub fn read_cycles() -> u64 {
    imp::read_cycles()
}

#[cfg(target_arch = "riscv64")]
mod imp {
    #[inline]
    pub(super) fn read_cycles() -> u64 {
        let cycles: u64;
        unsafe { core::arch::asm!("rdcycle {0}", out(reg) cycles) };
        cycles
    }
}

#[cfg(target_arch = "x86_64")]
mod imp {
    #[inline]
    pub(super) fn read_cycles() -> u64 {
        unsafe { core::arch::x86_64::_rdtsc() }
    }
}

#[cfg(not(any(target_arch = "riscv64", target_arch = "x86_64")))]
mod imp {
    #[inline]
    pub(super) fn read_cycles() -> u64 {
        super::EPOCH.elapsed().as_nanos() as u64
    }
}

/// Accumulated cycles, total and per entry point.
#[derive(Debug, Default)]
pub struct CycleLedger {
    total: CachePadded<AtomicU64>,
    open: CachePadded<AtomicU64>,
    send: CachePadded<AtomicU64>,
    receive: CachePadded<AtomicU64>,
}

impl CycleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the cycles elapsed since `start` to `op`. Returns the delta.
    pub fn record(&self, op: Op, start: u64) -> u64 {
        let delta = read_cycles().wrapping_sub(start);
        self.add(op, delta);
        delta
    }

    pub fn add(&self, op: Op, delta: u64) {
        self.total.fetch_add(delta, Ordering::Relaxed);
        self.slot(op).fetch_add(delta, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn get(&self, op: Op) -> u64 {
        self.slot(op).load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.open.store(0, Ordering::Relaxed);
        self.send.store(0, Ordering::Relaxed);
        self.receive.store(0, Ordering::Relaxed);
    }

    fn slot(&self, op: Op) -> &AtomicU64 {
        match op {
            Op::Open => &self.open,
            Op::Send => &self.send,
            Op::Receive => &self.receive,
        }
    }
}

#[cfg(not(any(target_arch = "riscv64", target_arch = "x86_64")))]
lazy_static! {
    static ref EPOCH: std::time::Instant = std::time::Instant::now();
}

lazy_static! {
    /// Cycles spent inside socket entry points across every session in the process.
    pub static ref SOCKET_CYCLES: CycleLedger = CycleLedger::new();
}
