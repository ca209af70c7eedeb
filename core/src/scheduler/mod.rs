//! Pluggable scheduler.
//!
//! Two policies implement the same contract: single-core priority and an
//! SMP priority policy keeping exactly one thread scheduled per processor.
//! The variant is resolved once at initialization — the hot path is a match
//! on a closed sum type, never a table lookup.

pub mod priority;
pub mod smp;

use core::cmp::Ordering as CmpOrdering;

use cadence_abi::thread::{INVALID_THREAD_ID, Priority, ThreadId, ThreadState};
use cadence_lib::percpu::{self, MAX_CPUS};
use cadence_lib::{IrqMutex, klog_info};
use spin::Once;

use crate::thread;
use priority::PriorityScheduler;
use smp::{EnqueueOutcome, ExtractOutcome, SmpScheduler};

pub enum Scheduler {
    Uniprocessor(PriorityScheduler),
    Smp(SmpScheduler),
}

static SCHEDULER: Once<IrqMutex<Scheduler>> = Once::new();

/// Select and reset the policy for the configured processor count.
pub fn scheduler_initialize(processor_count: usize) {
    let mutex = SCHEDULER
        .call_once(|| IrqMutex::new(Scheduler::Uniprocessor(PriorityScheduler::new())));
    let mut sched = mutex.lock();
    *sched = if processor_count > 1 {
        Scheduler::Smp(SmpScheduler::new(processor_count.min(MAX_CPUS)))
    } else {
        Scheduler::Uniprocessor(PriorityScheduler::new())
    };
    drop(sched);
    klog_info!(
        "SCHED: {} policy, {} processor(s)",
        if processor_count > 1 { "smp-priority" } else { "priority" },
        processor_count
    );
}

fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    let mutex = SCHEDULER.get().expect("scheduler not initialized");
    let mut sched = mutex.lock();
    f(&mut sched)
}

fn enqueue(tid: ThreadId, ahead_of_equals: bool) {
    let Some(priority) = thread::priority_of(tid) else {
        return;
    };
    let evicted = with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(policy) => {
            if ahead_of_equals {
                policy.insert_lifo(tid, priority);
            } else {
                policy.insert_fifo(tid, priority);
            }
            policy.reschedule();
            None
        }
        Scheduler::Smp(policy) => match policy.enqueue(tid, priority, ahead_of_equals) {
            EnqueueOutcome::Evicted { victim, .. } => Some(victim),
            _ => None,
        },
    });
    if let Some(victim) = evicted {
        let _ = thread::set_state(victim, ThreadState::Ready);
    }
}

/// Make a thread eligible to run, behind equal-priority threads.
pub fn enqueue_priority_fifo(tid: ThreadId) {
    enqueue(tid, false);
}

/// Make a thread eligible to run, ahead of equal-priority threads.
pub fn enqueue_priority_lifo(tid: ThreadId) {
    enqueue(tid, true);
}

/// Remove a thread from the ready/scheduled structures. Absence is a
/// defined no-op, reported as `false`.
pub fn extract(tid: ThreadId) -> bool {
    with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(policy) => {
            let found = policy.remove(tid);
            if found {
                policy.reschedule();
            }
            found
        }
        Scheduler::Smp(policy) => !matches!(policy.extract(tid), ExtractOutcome::NotFound),
    })
}

/// Suspend a thread: state transition plus removal from the runnable
/// structures. The freed processor (if any) is handed to the next thread.
pub fn block(tid: ThreadId) {
    let _ = thread::set_state(tid, ThreadState::Blocked);
    extract(tid);
}

/// Resume a thread: state transition plus normal-arrival enqueue.
pub fn unblock(tid: ThreadId) {
    let _ = thread::set_state(tid, ThreadState::Ready);
    enqueue_priority_fifo(tid);
}

/// Re-evaluate whether a thread should run (e.g. after a priority change).
pub fn schedule(tid: ThreadId) {
    let Some(priority) = thread::priority_of(tid) else {
        return;
    };
    let evicted = with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(policy) => {
            if policy.remove(tid) {
                policy.insert_fifo(tid, priority);
                policy.reschedule();
            }
            None
        }
        Scheduler::Smp(policy) => {
            if matches!(policy.extract(tid), ExtractOutcome::NotFound) {
                return None;
            }
            match policy.enqueue(tid, priority, false) {
                EnqueueOutcome::Evicted { victim, .. } => Some(victim),
                _ => None,
            }
        }
    });
    if let Some(victim) = evicted {
        let _ = thread::set_state(victim, ThreadState::Ready);
    }
}

/// Voluntarily step behind equal-priority peers.
pub fn yield_thread(tid: ThreadId) {
    let Some(priority) = thread::priority_of(tid) else {
        return;
    };
    with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(policy) => {
            if policy.remove(tid) {
                policy.insert_fifo(tid, priority);
                policy.reschedule();
            }
        }
        Scheduler::Smp(policy) => policy.yield_thread(tid),
    });
}

/// Install the idle thread for a processor and make it the initial
/// executing/heir thread there. Idle threads never enter the ready
/// structures.
pub fn start_idle(tid: ThreadId, cpu: usize) {
    let control = percpu::per_cpu(cpu);
    control.set_idle_thread(tid);
    control.set_executing(tid);
    control.set_heir(tid);
    control.set_dispatch_needed(false);
    let _ = thread::set_state(tid, ThreadState::Running);
    with_scheduler(|sched| {
        if let Scheduler::Uniprocessor(policy) = sched {
            policy.set_idle(tid);
        }
        // The SMP policy models an idle processor as an empty scheduled
        // slot; the per-CPU record above is all it needs.
    });
}

/// Total order over threads: lower priority value runs first, ties resolved
/// by thread id so the order is deterministic.
pub fn priority_compare(a: ThreadId, b: ThreadId) -> CmpOrdering {
    let pa = thread::priority_of(a).unwrap_or(Priority::MAX);
    let pb = thread::priority_of(b).unwrap_or(Priority::MAX);
    pa.cmp(&pb).then(a.cmp(&b))
}

/// Apply an effective-priority change and re-place the thread wherever it
/// currently queues (ready structures or a priority-discipline wait queue).
pub fn update_priority(tid: ThreadId, priority: Priority) {
    if thread::set_current_priority(tid, priority) != cadence_abi::Status::Successful {
        return;
    }
    schedule(tid);
    crate::waitq::requeue(tid, priority);
}

pub fn ready_count() -> u32 {
    with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(policy) => policy.ready_count(),
        Scheduler::Smp(policy) => policy.ready_count(),
    })
}

/// Threads currently holding a processor, in processor order. On the
/// uniprocessor policy this is just the heir.
pub fn scheduled_snapshot(out: &mut [ThreadId]) -> usize {
    with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(_) => {
            let heir = percpu::per_cpu(0).heir();
            if heir == INVALID_THREAD_ID || out.is_empty() {
                0
            } else {
                out[0] = heir;
                1
            }
        }
        Scheduler::Smp(policy) => policy.scheduled_snapshot(out),
    })
}

/// Is the thread anywhere in the policy's structures?
pub fn is_queued(tid: ThreadId) -> bool {
    with_scheduler(|sched| match sched {
        Scheduler::Uniprocessor(policy) => policy.contains(tid),
        Scheduler::Smp(policy) => policy.contains(tid),
    })
}
