//! The Giant Lock.
//!
//! One recursive lock serializing all SMP-wide kernel-data mutation in this
//! kernel generation: scheduler state, wait-queue membership and the
//! resource forest are only touched with the Giant Lock held. Finer-grained
//! locking is deliberately absent — worst-case latency predictability beats
//! parallel throughput here.
//!
//! Invariant: `nest_level` is non-zero exactly while `owner_cpu` names the
//! acquiring processor.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

use cadence_abi::FatalCode;

const NO_OWNER: u32 = u32::MAX;

struct GiantLock {
    owner_cpu: AtomicU32,
    nest_level: AtomicU32,
}

static GIANT: GiantLock = GiantLock {
    owner_cpu: AtomicU32::new(NO_OWNER),
    nest_level: AtomicU32::new(0),
};

/// Acquire the Giant Lock for `cpu_index`, recursively if already owned by
/// this processor. Interrupts must be masked by the caller.
pub fn giant_acquire(cpu_index: usize) {
    let cpu = cpu_index as u32;

    if GIANT.owner_cpu.load(Ordering::Acquire) == cpu {
        let level = GIANT.nest_level.load(Ordering::Relaxed);
        GIANT.nest_level.store(level + 1, Ordering::Relaxed);
        return;
    }

    while GIANT
        .owner_cpu
        .compare_exchange_weak(NO_OWNER, cpu, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
    {
        spin_loop();
    }

    debug_assert_eq!(GIANT.nest_level.load(Ordering::Relaxed), 0);
    GIANT.nest_level.store(1, Ordering::Relaxed);
}

/// Release one nesting level of the Giant Lock.
///
/// Releasing from a processor that does not own the lock is an internal
/// consistency violation.
pub fn giant_release(cpu_index: usize) {
    let cpu = cpu_index as u32;

    if GIANT.owner_cpu.load(Ordering::Acquire) != cpu {
        debug_assert!(false, "giant lock released by non-owner");
        crate::fatal::kernel_fatal(FatalCode::GiantLockNotOwner);
    }

    let level = GIANT.nest_level.load(Ordering::Relaxed);
    debug_assert!(level > 0, "giant lock nest level underflow");

    if level <= 1 {
        GIANT.nest_level.store(0, Ordering::Relaxed);
        GIANT.owner_cpu.store(NO_OWNER, Ordering::Release);
    } else {
        GIANT.nest_level.store(level - 1, Ordering::Relaxed);
    }
}

/// Unconditionally drop every nesting level held by `cpu_index`.
///
/// Fatal-unwind path only: skips the normal acquire/release symmetry. A
/// processor that does not own the lock is a no-op.
pub fn giant_drop(cpu_index: usize) {
    let cpu = cpu_index as u32;

    if GIANT.owner_cpu.load(Ordering::Acquire) != cpu {
        return;
    }

    GIANT.nest_level.store(0, Ordering::Relaxed);
    GIANT.owner_cpu.store(NO_OWNER, Ordering::Release);
}

/// Does `cpu_index` currently own the Giant Lock?
#[inline]
pub fn giant_is_owner(cpu_index: usize) -> bool {
    GIANT.owner_cpu.load(Ordering::Acquire) == cpu_index as u32
}

/// Current nesting depth (0 when unowned).
#[inline]
pub fn giant_nest_level() -> u32 {
    GIANT.nest_level.load(Ordering::Acquire)
}
