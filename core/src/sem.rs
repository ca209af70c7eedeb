//! Semaphores.
//!
//! A thin veneer over the wait queue, the scheduler and the resource
//! tracker. Counting semaphores are plain counters with a wait queue.
//! Binary semaphores additionally track ownership through the resource
//! forest and run the priority-inheritance protocol: a blocked obtainer
//! boosts every lower-urgency thread along the dependency chain, and a
//! releasing owner falls back to its real priority adjusted for whatever
//! rivals remain on its other resources.

use cadence_abi::thread::{BlockReason, INVALID_THREAD_ID, MAX_THREADS, ThreadId};
use cadence_abi::Status;
use cadence_lib::IrqMutex;

use crate::dispatch::DispatchGuard;
use crate::resource::{self, IterateDecision};
use crate::waitq::{self, Discipline};
use crate::{scheduler, thread};

pub const MAX_SEMAPHORES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SemaphoreKind {
    Counting,
    /// Count is clamped to one and ownership is tracked for inheritance.
    Binary,
}

#[derive(Clone, Copy)]
struct SemaphoreControl {
    in_use: bool,
    kind: SemaphoreKind,
    count: u32,
    wait_queue: u32,
    resource: u32,
}

impl SemaphoreControl {
    const fn empty() -> Self {
        Self {
            in_use: false,
            kind: SemaphoreKind::Counting,
            count: 0,
            wait_queue: waitq::INVALID_WAIT_QUEUE_ID,
            resource: resource::INVALID_RESOURCE_ID,
        }
    }
}

struct SemaphoreTable {
    semaphores: [SemaphoreControl; MAX_SEMAPHORES],
}

impl SemaphoreTable {
    const fn new() -> Self {
        Self {
            semaphores: [SemaphoreControl::empty(); MAX_SEMAPHORES],
        }
    }

    fn is_live(&self, sid: u32) -> bool {
        (sid as usize) < MAX_SEMAPHORES && self.semaphores[sid as usize].in_use
    }
}

static SEMAPHORES: IrqMutex<SemaphoreTable> = IrqMutex::new(SemaphoreTable::new());

pub fn sem_initialize() {
    let mut table = SEMAPHORES.lock();
    *table = SemaphoreTable::new();
}

pub fn semaphore_create(
    kind: SemaphoreKind,
    initial_count: u32,
    discipline: Discipline,
) -> Result<u32, Status> {
    if kind == SemaphoreKind::Binary && initial_count > 1 {
        return Err(Status::InvalidSize);
    }

    let wait_queue = waitq::waitq_create(discipline)?;
    let tracked = if kind == SemaphoreKind::Binary {
        match resource::resource_create() {
            Ok(rid) => rid,
            Err(status) => {
                let _ = waitq::waitq_destroy(wait_queue);
                return Err(status);
            }
        }
    } else {
        resource::INVALID_RESOURCE_ID
    };

    let mut table = SEMAPHORES.lock();
    let Some(index) = table.semaphores.iter().position(|s| !s.in_use) else {
        drop(table);
        let _ = waitq::waitq_destroy(wait_queue);
        if tracked != resource::INVALID_RESOURCE_ID {
            let _ = resource::resource_destroy(tracked);
        }
        return Err(Status::TooMany);
    };
    table.semaphores[index] = SemaphoreControl {
        in_use: true,
        kind,
        count: initial_count,
        wait_queue,
        resource: tracked,
    };
    Ok(index as u32)
}

/// Delete a semaphore; blocked threads resume with `ObjectWasDeleted`.
pub fn semaphore_delete(sid: u32) -> Status {
    let (wait_queue, tracked) = {
        let mut table = SEMAPHORES.lock();
        if !table.is_live(sid) {
            return Status::InvalidId;
        }
        let control = table.semaphores[sid as usize];
        table.semaphores[sid as usize] = SemaphoreControl::empty();
        (control.wait_queue, control.resource)
    };
    let status = waitq::waitq_destroy(wait_queue);
    if tracked != resource::INVALID_RESOURCE_ID {
        let _ = resource::resource_destroy(tracked);
    }
    status
}

pub fn semaphore_count(sid: u32) -> Result<u32, Status> {
    let table = SEMAPHORES.lock();
    if !table.is_live(sid) {
        return Err(Status::InvalidId);
    }
    Ok(table.semaphores[sid as usize].count)
}

/// Current owner of a binary semaphore, if held.
pub fn semaphore_holder(sid: u32) -> Option<ThreadId> {
    let tracked = {
        let table = SEMAPHORES.lock();
        if !table.is_live(sid) {
            return None;
        }
        table.semaphores[sid as usize].resource
    };
    if tracked == resource::INVALID_RESOURCE_ID {
        return None;
    }
    resource::owner_of(tracked)
}

/// Boost every thread along the dependency chain above `rid` that runs at
/// lower urgency than `priority`.
fn inherit_priority(rid: u32, priority: cadence_abi::Priority) {
    let mut boosted = [INVALID_THREAD_ID; MAX_THREADS];
    let mut boosted_count = 0usize;

    let _ = resource::iterate(rid, &mut |owner| {
        if boosted_count < boosted.len() {
            boosted[boosted_count] = owner;
            boosted_count += 1;
        }
        IterateDecision::Continue
    });

    for owner in boosted.iter().take(boosted_count) {
        let needs_boost = thread::priority_of(*owner).is_some_and(|p| p > priority);
        if needs_boost {
            scheduler::update_priority(*owner, priority);
        }
    }
}

/// Obtain the semaphore for `tid`.
pub fn semaphore_obtain(sid: u32, tid: ThreadId, wait: bool, timeout_ticks: u64) -> Status {
    let _guard = DispatchGuard::new();

    let (kind, tracked, wait_queue, acquired) = {
        let mut table = SEMAPHORES.lock();
        if !table.is_live(sid) {
            return Status::InvalidId;
        }
        let control = &mut table.semaphores[sid as usize];
        let acquired = control.count > 0;
        if acquired {
            control.count -= 1;
        }
        (control.kind, control.resource, control.wait_queue, acquired)
    };

    if acquired {
        if kind == SemaphoreKind::Binary {
            let status = resource::obtain(tracked, tid);
            debug_assert_eq!(status, Status::Successful);
        }
        return Status::Successful;
    }

    if !wait {
        return Status::Unsatisfied;
    }

    if kind == SemaphoreKind::Binary {
        // Record the dependency edge, then boost along the chain.
        let _ = resource::obtain(tracked, tid);
        if let Some(priority) = thread::priority_of(tid) {
            inherit_priority(tracked, priority);
        }
    }

    thread::set_block_reason(tid, BlockReason::Semaphore);
    waitq::enqueue(wait_queue, tid, timeout_ticks);

    // Resumed by release, timeout or deletion.
    let status = thread::wait_status(tid);
    if !status.is_successful() && kind == SemaphoreKind::Binary {
        // The wait ended without the resource; drop the rival registration.
        resource::abandon(tracked, tid);
    }
    status
}

/// Release the semaphore held by `tid`.
///
/// Binary semaphores transfer ownership directly to the longest-waiting
/// thread per the queue's discipline (no wake-then-retry), restore the
/// releaser's inherited priority, and make the successor the heir when its
/// urgency demands it.
pub fn semaphore_release(sid: u32, tid: ThreadId) -> Status {
    let _guard = DispatchGuard::new();

    let (kind, tracked, wait_queue) = {
        let table = SEMAPHORES.lock();
        if !table.is_live(sid) {
            return Status::InvalidId;
        }
        let control = table.semaphores[sid as usize];
        (control.kind, control.resource, control.wait_queue)
    };

    let successor = waitq::dequeue(wait_queue);

    if kind == SemaphoreKind::Binary {
        match resource::release(tracked, tid, successor) {
            Ok(_) => {}
            Err(status) => return status,
        }
        restore_priority(tid);
    }

    match successor {
        Some(winner) => {
            thread::set_wait_status(winner, Status::Successful);
            scheduler::unblock(winner);
        }
        None => {
            let mut table = SEMAPHORES.lock();
            if table.is_live(sid) {
                let control = &mut table.semaphores[sid as usize];
                control.count = match control.kind {
                    SemaphoreKind::Binary => 1,
                    SemaphoreKind::Counting => control.count.saturating_add(1),
                };
            }
        }
    }
    Status::Successful
}

/// Recompute a thread's effective priority from its real priority and the
/// highest-urgency rival still contending for anything it owns.
fn restore_priority(tid: ThreadId) {
    let Some(real) = thread::real_priority_of(tid) else {
        return;
    };
    let effective = match resource::highest_rival_priority(tid) {
        Some(rival) => rival.min(real),
        None => real,
    };
    if thread::priority_of(tid) != Some(effective) {
        scheduler::update_priority(tid, effective);
    }
}
