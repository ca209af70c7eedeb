//! Timeout watchdog table.
//!
//! One deadline slot per thread, armed when a blocking operation carries a
//! timeout and cancelled on satisfaction. The platform's periodic tick path
//! calls [`watchdog_tick`] with the current tick count; due entries are
//! collected under the table lock and delivered to the wait-queue timeout
//! handler outside it, which re-validates membership on its own.

use cadence_abi::thread::{INVALID_THREAD_ID, MAX_THREADS, ThreadId};
use cadence_lib::IrqMutex;

use crate::waitq;

#[derive(Clone, Copy)]
struct WatchdogEntry {
    deadline: u64,
    active: bool,
}

impl WatchdogEntry {
    const fn empty() -> Self {
        Self {
            deadline: 0,
            active: false,
        }
    }
}

struct WatchdogTable {
    entries: [WatchdogEntry; MAX_THREADS],
}

impl WatchdogTable {
    const fn new() -> Self {
        Self {
            entries: [WatchdogEntry::empty(); MAX_THREADS],
        }
    }
}

static WATCHDOGS: IrqMutex<WatchdogTable> = IrqMutex::new(WatchdogTable::new());

/// Wrap-safe "has `deadline` been reached at `now`" comparison.
#[inline]
fn tick_reached(now: u64, deadline: u64) -> bool {
    now.wrapping_sub(deadline) < (1u64 << 63)
}

pub fn watchdog_initialize() {
    let mut table = WATCHDOGS.lock();
    *table = WatchdogTable::new();
}

/// Arm (or re-arm) the thread's timeout at an absolute tick.
pub fn arm(tid: ThreadId, deadline: u64) {
    if (tid as usize) >= MAX_THREADS {
        return;
    }
    let mut table = WATCHDOGS.lock();
    table.entries[tid as usize] = WatchdogEntry {
        deadline,
        active: true,
    };
}

/// Disarm the thread's timeout. Harmless when not armed.
pub fn cancel(tid: ThreadId) {
    if (tid as usize) >= MAX_THREADS {
        return;
    }
    let mut table = WATCHDOGS.lock();
    table.entries[tid as usize] = WatchdogEntry::empty();
}

pub fn is_armed(tid: ThreadId) -> bool {
    (tid as usize) < MAX_THREADS && WATCHDOGS.lock().entries[tid as usize].active
}

/// Fire every due entry. Called from the platform tick path.
pub fn watchdog_tick(now: u64) {
    let mut due = [INVALID_THREAD_ID; MAX_THREADS];
    let mut due_count = 0;
    {
        let mut table = WATCHDOGS.lock();
        for (index, entry) in table.entries.iter_mut().enumerate() {
            if entry.active && tick_reached(now, entry.deadline) {
                *entry = WatchdogEntry::empty();
                due[due_count] = index as ThreadId;
                due_count += 1;
            }
        }
    }

    for tid in due.iter().take(due_count) {
        waitq::timeout_expired(*tid);
    }
}
