//! Per-CPU kernel context.
//!
//! One `PerCpuControl` record per processor, all owned by a single kernel
//! context object in this module — there are no other ambient globals for
//! per-processor state. Slots are created at boot and never destroyed;
//! lookup is by processor index.
//!
//! Fields are atomics because the dispatch-disable level and the heir are
//! read from interrupt context and, on SMP, peeked by other processors when
//! they select a victim for preemption.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use cadence_abi::{INVALID_THREAD_ID, ThreadId};

use crate::InitFlag;
use crate::kernel_services::platform;

/// Maximum number of processors supported.
pub const MAX_CPUS: usize = 32;

/// Per-CPU control record.
///
/// Cache-line aligned to prevent false sharing between processors.
#[repr(align(64))]
pub struct PerCpuControl {
    /// Dispatch-disable nesting counter. While non-zero, a context switch on
    /// this processor is deferred, not performed.
    dispatch_disable_level: AtomicU32,
    /// Thread currently executing on this processor.
    executing: AtomicU32,
    /// Thread selected to run next; equals `executing` when no switch is
    /// pending.
    heir: AtomicU32,
    /// Set when the heir differs from the executing thread and a dispatch
    /// must happen once the disable level drains to zero.
    dispatch_needed: AtomicBool,
    /// Idle thread installed for this processor at scheduler start.
    idle_thread: AtomicU32,
}

impl PerCpuControl {
    const fn new() -> Self {
        Self {
            dispatch_disable_level: AtomicU32::new(0),
            executing: AtomicU32::new(INVALID_THREAD_ID),
            heir: AtomicU32::new(INVALID_THREAD_ID),
            dispatch_needed: AtomicBool::new(false),
            idle_thread: AtomicU32::new(INVALID_THREAD_ID),
        }
    }

    fn reset(&self) {
        self.dispatch_disable_level.store(0, Ordering::Relaxed);
        self.executing.store(INVALID_THREAD_ID, Ordering::Relaxed);
        self.heir.store(INVALID_THREAD_ID, Ordering::Relaxed);
        self.dispatch_needed.store(false, Ordering::Relaxed);
        self.idle_thread.store(INVALID_THREAD_ID, Ordering::Relaxed);
    }

    #[inline]
    pub fn dispatch_disable_level(&self) -> u32 {
        self.dispatch_disable_level.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_dispatch_disable_level(&self, level: u32) {
        self.dispatch_disable_level.store(level, Ordering::Release);
    }

    #[inline]
    pub fn executing(&self) -> ThreadId {
        self.executing.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_executing(&self, thread: ThreadId) {
        self.executing.store(thread, Ordering::Release);
    }

    #[inline]
    pub fn heir(&self) -> ThreadId {
        self.heir.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_heir(&self, thread: ThreadId) {
        self.heir.store(thread, Ordering::Release);
    }

    #[inline]
    pub fn dispatch_needed(&self) -> bool {
        self.dispatch_needed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_dispatch_needed(&self, needed: bool) {
        self.dispatch_needed.store(needed, Ordering::Release);
    }

    #[inline]
    pub fn idle_thread(&self) -> ThreadId {
        self.idle_thread.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_idle_thread(&self, thread: ThreadId) {
        self.idle_thread.store(thread, Ordering::Release);
    }
}

/// The kernel context: every per-CPU slot, behind one module boundary.
struct KernelContext {
    slots: [PerCpuControl; MAX_CPUS],
    cpu_count: AtomicUsize,
}

static KERNEL_CONTEXT: KernelContext = {
    const SLOT: PerCpuControl = PerCpuControl::new();
    KernelContext {
        slots: [SLOT; MAX_CPUS],
        cpu_count: AtomicUsize::new(1),
    }
};

static PERCPU_INIT: InitFlag = InitFlag::new();

/// Initialize the per-CPU slots for `count` processors.
///
/// Safe to call again (e.g. from a test fixture): every slot is reset to its
/// boot state and the processor count replaced.
pub fn percpu_init(count: usize) {
    let count = count.clamp(1, MAX_CPUS);
    for slot in KERNEL_CONTEXT.slots.iter() {
        slot.reset();
    }
    KERNEL_CONTEXT.cpu_count.store(count, Ordering::Release);
    if PERCPU_INIT.init_once() {
        crate::klog_info!("PERCPU: kernel context ready, {} processor(s)", count);
    }
}

/// Number of processors configured at init.
#[inline]
pub fn cpu_count() -> usize {
    KERNEL_CONTEXT.cpu_count.load(Ordering::Acquire)
}

/// Per-CPU slot for the given processor index. Out-of-range indices clamp
/// to the last configured slot rather than faulting; callers are expected to
/// stay within `cpu_count()`.
#[inline]
pub fn per_cpu(index: usize) -> &'static PerCpuControl {
    let bounded = index.min(cpu_count().saturating_sub(1));
    &KERNEL_CONTEXT.slots[bounded]
}

/// Index of the processor executing the caller.
#[inline]
pub fn current_processor_index() -> usize {
    platform::current_processor().min(cpu_count().saturating_sub(1))
}

/// Per-CPU slot of the processor executing the caller.
#[inline]
pub fn current_per_cpu() -> &'static PerCpuControl {
    per_cpu(current_processor_index())
}
