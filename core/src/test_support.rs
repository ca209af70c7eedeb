//! Shared fixtures for the built-in test suites.
//!
//! The hosted platform fallback treats context switches as completed
//! bookkeeping, so a whole blocking protocol can be driven from one flow of
//! control: operations run with the caller standing in for the thread id
//! they pass, and the deferred heir hand-off is settled either by the
//! `DispatchGuard` drop inside the operation (processor 0) or explicitly
//! via [`settle`].

use cadence_abi::thread::{INVALID_THREAD_ID, Priority, PRIORITY_IDLE, ThreadId};
use cadence_lib::percpu;

use crate::{scheduler, thread};

/// RAII fixture that reinitializes the whole core for a test and leaves a
/// clean single-processor core behind on drop.
pub struct CoreFixture;

impl CoreFixture {
    pub fn new(processor_count: usize) -> Self {
        crate::kernel_core_initialize(processor_count);
        Self
    }

    pub fn uniprocessor() -> Self {
        Self::new(1)
    }
}

impl Drop for CoreFixture {
    fn drop(&mut self) {
        crate::kernel_core_initialize(1);
    }
}

/// Create a thread that is ready but not yet known to the scheduler.
pub fn spawn(name: &str, priority: Priority) -> ThreadId {
    thread::thread_create(name, priority).unwrap_or(INVALID_THREAD_ID)
}

/// Create a thread and hand it to the scheduler as a normal arrival.
pub fn spawn_ready(name: &str, priority: Priority) -> ThreadId {
    let tid = spawn(name, priority);
    if tid != INVALID_THREAD_ID {
        scheduler::enqueue_priority_fifo(tid);
    }
    tid
}

/// Install an idle thread on `cpu` and make it the executing thread there.
pub fn install_idle(cpu: usize) -> ThreadId {
    let tid = spawn("idle", PRIORITY_IDLE);
    if tid != INVALID_THREAD_ID {
        scheduler::start_idle(tid, cpu);
    }
    tid
}

/// Settle any pending heir hand-off on `cpu`, mirroring what the dispatch
/// controller does when the disable level drains to zero.
pub fn settle(cpu: usize) {
    let control = percpu::per_cpu(cpu);
    while control.dispatch_needed() {
        control.set_dispatch_needed(false);
        let executing = control.executing();
        let heir = control.heir();
        if heir == INVALID_THREAD_ID || heir == executing {
            continue;
        }
        control.set_executing(heir);
        thread::note_context_switch(executing, heir);
    }
}

/// Executing thread on `cpu`.
pub fn executing_on(cpu: usize) -> ThreadId {
    percpu::per_cpu(cpu).executing()
}

/// Heir thread on `cpu`.
pub fn heir_on(cpu: usize) -> ThreadId {
    percpu::per_cpu(cpu).heir()
}
