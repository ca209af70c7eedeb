//! Generic blocking wait queues.
//!
//! Every synchronization object embeds one of these by handle; the queue's
//! lifetime equals the object's. Two disciplines: FIFO (arrival order) and
//! priority with arrival-order tiebreak. A thread occupies at most one wait
//! queue at any time — membership lives in a per-thread link arena, which
//! makes the disjointness structurally enforced.
//!
//! Timeout discipline: the watchdog callback re-validates membership under
//! the table lock before touching anything, because the thread may already
//! have been satisfied in the race window. Whichever side wins the lock
//! performs the transition; the loser is a no-op.

use cadence_abi::thread::{INVALID_THREAD_ID, MAX_THREADS, NO_TIMEOUT, Priority, ThreadId};
use cadence_abi::Status;
use cadence_lib::kernel_services::platform;
use cadence_lib::{IrqMutex, klog_debug};

use crate::{scheduler, thread, watchdog};

pub const MAX_WAIT_QUEUES: usize = 32;

pub const INVALID_WAIT_QUEUE_ID: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discipline {
    Fifo,
    Priority,
}

#[derive(Clone, Copy)]
struct WaitLink {
    /// Queue this thread waits on, or `INVALID_WAIT_QUEUE_ID`.
    queue: u32,
    next: u32,
    /// Monotonic arrival stamp, the FIFO key and the priority tiebreak.
    arrival: u64,
    /// Priority snapshot taken at enqueue (re-stamped by `requeue`).
    priority: Priority,
}

impl WaitLink {
    const fn empty() -> Self {
        Self {
            queue: INVALID_WAIT_QUEUE_ID,
            next: INVALID_THREAD_ID,
            arrival: 0,
            priority: 0,
        }
    }
}

#[derive(Clone, Copy)]
struct WaitQueueControl {
    in_use: bool,
    discipline: Discipline,
    head: u32,
    count: u32,
}

impl WaitQueueControl {
    const fn empty() -> Self {
        Self {
            in_use: false,
            discipline: Discipline::Fifo,
            head: INVALID_THREAD_ID,
            count: 0,
        }
    }
}

struct WaitQueueTable {
    queues: [WaitQueueControl; MAX_WAIT_QUEUES],
    links: [WaitLink; MAX_THREADS],
    next_arrival: u64,
}

impl WaitQueueTable {
    const fn new() -> Self {
        Self {
            queues: [WaitQueueControl::empty(); MAX_WAIT_QUEUES],
            links: [WaitLink::empty(); MAX_THREADS],
            next_arrival: 0,
        }
    }

    /// Should the thread keyed `(priority, arrival)` go before `other`?
    fn goes_before(&self, discipline: Discipline, priority: Priority, arrival: u64, other: u32) -> bool {
        let other_link = &self.links[other as usize];
        match discipline {
            Discipline::Fifo => arrival < other_link.arrival,
            Discipline::Priority => {
                (priority, arrival) < (other_link.priority, other_link.arrival)
            }
        }
    }

    fn insert(&mut self, qid: u32, tid: ThreadId, priority: Priority, arrival: u64) {
        let discipline = self.queues[qid as usize].discipline;
        let mut prev = INVALID_THREAD_ID;
        let mut cursor = self.queues[qid as usize].head;
        while cursor != INVALID_THREAD_ID {
            if self.goes_before(discipline, priority, arrival, cursor) {
                break;
            }
            prev = cursor;
            cursor = self.links[cursor as usize].next;
        }

        let link = &mut self.links[tid as usize];
        link.queue = qid;
        link.priority = priority;
        link.arrival = arrival;
        link.next = cursor;
        if prev == INVALID_THREAD_ID {
            self.queues[qid as usize].head = tid;
        } else {
            self.links[prev as usize].next = tid;
        }
        self.queues[qid as usize].count += 1;
    }

    /// Unlink `tid` from the queue it occupies. `false` when not queued.
    fn unlink(&mut self, tid: ThreadId) -> bool {
        let qid = self.links[tid as usize].queue;
        if qid == INVALID_WAIT_QUEUE_ID {
            return false;
        }
        let mut prev = INVALID_THREAD_ID;
        let mut cursor = self.queues[qid as usize].head;
        while cursor != INVALID_THREAD_ID {
            if cursor == tid {
                let next = self.links[tid as usize].next;
                if prev == INVALID_THREAD_ID {
                    self.queues[qid as usize].head = next;
                } else {
                    self.links[prev as usize].next = next;
                }
                self.queues[qid as usize].count -= 1;
                self.links[tid as usize] = WaitLink::empty();
                return true;
            }
            prev = cursor;
            cursor = self.links[cursor as usize].next;
        }
        // The link named a queue the chain does not contain.
        debug_assert!(false, "wait queue chain corrupt");
        cadence_lib::kernel_fatal(cadence_abi::FatalCode::WaitQueueCorrupt);
    }

    fn pop_head(&mut self, qid: u32) -> Option<ThreadId> {
        let head = self.queues[qid as usize].head;
        if head == INVALID_THREAD_ID {
            return None;
        }
        self.queues[qid as usize].head = self.links[head as usize].next;
        self.queues[qid as usize].count -= 1;
        self.links[head as usize] = WaitLink::empty();
        Some(head)
    }
}

static WAIT_QUEUES: IrqMutex<WaitQueueTable> = IrqMutex::new(WaitQueueTable::new());

/// Reset every queue and link to the boot state.
pub fn waitq_initialize() {
    let mut table = WAIT_QUEUES.lock();
    *table = WaitQueueTable::new();
}

pub fn waitq_create(discipline: Discipline) -> Result<u32, Status> {
    let mut table = WAIT_QUEUES.lock();
    let Some(index) = table.queues.iter().position(|q| !q.in_use) else {
        return Err(Status::TooMany);
    };
    table.queues[index] = WaitQueueControl {
        in_use: true,
        discipline,
        head: INVALID_THREAD_ID,
        count: 0,
    };
    Ok(index as u32)
}

/// Destroy a queue, resuming every remaining waiter with
/// `ObjectWasDeleted`.
pub fn waitq_destroy(qid: u32) -> Status {
    if !is_valid(qid) {
        return Status::InvalidId;
    }
    flush(qid, Status::ObjectWasDeleted);
    WAIT_QUEUES.lock().queues[qid as usize] = WaitQueueControl::empty();
    Status::Successful
}

fn is_valid(qid: u32) -> bool {
    (qid as usize) < MAX_WAIT_QUEUES && WAIT_QUEUES.lock().queues[qid as usize].in_use
}

/// Enqueue the caller on `qid` and suspend it.
///
/// The caller must already be inside the object's critical section
/// (dispatch disabled); the suspension takes effect when that region
/// drains. A non-`NO_TIMEOUT` timeout arms the watchdog at
/// `now + timeout_ticks`.
pub fn enqueue(qid: u32, tid: ThreadId, timeout_ticks: u64) -> Status {
    let Some(priority) = thread::priority_of(tid) else {
        return Status::InvalidId;
    };

    {
        let mut table = WAIT_QUEUES.lock();
        if (qid as usize) >= MAX_WAIT_QUEUES || !table.queues[qid as usize].in_use {
            return Status::InvalidId;
        }
        debug_assert!(
            table.links[tid as usize].queue == INVALID_WAIT_QUEUE_ID,
            "thread already on a wait queue"
        );
        let arrival = table.next_arrival;
        table.next_arrival += 1;
        table.insert(qid, tid, priority, arrival);
    }

    thread::set_wait_queue(tid, qid);
    thread::set_wait_status(tid, Status::Successful);

    if timeout_ticks != NO_TIMEOUT {
        watchdog::arm(tid, platform::timer_ticks().wrapping_add(timeout_ticks));
    }

    scheduler::block(tid);
    Status::Successful
}

/// Remove and return the head waiter per the queue's discipline, with its
/// membership and timeout cleared. The caller decides what resumption
/// status to deliver and when to unblock.
pub fn dequeue(qid: u32) -> Option<ThreadId> {
    let popped = {
        let mut table = WAIT_QUEUES.lock();
        if (qid as usize) >= MAX_WAIT_QUEUES || !table.queues[qid as usize].in_use {
            return None;
        }
        table.pop_head(qid)
    };
    if let Some(tid) = popped {
        watchdog::cancel(tid);
        thread::set_wait_queue(tid, INVALID_WAIT_QUEUE_ID);
    }
    popped
}

/// Remove a thread from whatever queue it occupies. Not being queued is a
/// defined no-op reported as `false`, never undefined behavior.
pub fn extract(tid: ThreadId) -> bool {
    if (tid as usize) >= MAX_THREADS {
        return false;
    }
    let removed = {
        let mut table = WAIT_QUEUES.lock();
        table.unlink(tid)
    };
    if removed {
        watchdog::cancel(tid);
        thread::set_wait_queue(tid, INVALID_WAIT_QUEUE_ID);
    }
    removed
}

/// Extract plus resumption: deliver `status` and make the thread runnable
/// again. Used by deletion, restart and object teardown so the resumed
/// thread observes a distinct error rather than success.
pub fn extract_with_status(tid: ThreadId, status: Status) -> bool {
    if !extract(tid) {
        return false;
    }
    thread::set_wait_status(tid, status);
    scheduler::unblock(tid);
    true
}

/// Drain the queue, resuming every waiter with `status`. Returns the number
/// of threads resumed.
pub fn flush(qid: u32, status: Status) -> u32 {
    let mut flushed = 0;
    while let Some(tid) = dequeue(qid) {
        thread::set_wait_status(tid, status);
        scheduler::unblock(tid);
        flushed += 1;
    }
    if flushed > 0 {
        klog_debug!("WAITQ: flushed {} thread(s) from queue {}", flushed, qid);
    }
    flushed
}

/// Watchdog-side timeout delivery.
///
/// Runs asynchronously with respect to the blocked thread: membership is
/// re-validated under the table lock first, because a satisfier may have
/// already dequeued the thread in the race window. Losing the race makes
/// this a no-op.
pub fn timeout_expired(tid: ThreadId) {
    let still_queued = {
        let mut table = WAIT_QUEUES.lock();
        table.unlink(tid)
    };
    if !still_queued {
        return;
    }
    thread::set_wait_queue(tid, INVALID_WAIT_QUEUE_ID);
    thread::set_wait_status(tid, Status::Timeout);
    scheduler::unblock(tid);
}

/// Re-place a queued thread after a priority change, keeping its original
/// arrival stamp so the tiebreak is stable. No-op for FIFO queues and for
/// threads not currently queued.
pub fn requeue(tid: ThreadId, priority: Priority) {
    if (tid as usize) >= MAX_THREADS {
        return;
    }
    let mut table = WAIT_QUEUES.lock();
    let qid = table.links[tid as usize].queue;
    if qid == INVALID_WAIT_QUEUE_ID {
        return;
    }
    if table.queues[qid as usize].discipline != Discipline::Priority {
        return;
    }
    let arrival = table.links[tid as usize].arrival;
    if table.unlink(tid) {
        table.insert(qid, tid, priority, arrival);
    }
}

/// Number of threads waiting on `qid`.
pub fn queue_count(qid: u32) -> u32 {
    let table = WAIT_QUEUES.lock();
    if (qid as usize) >= MAX_WAIT_QUEUES || !table.queues[qid as usize].in_use {
        return 0;
    }
    table.queues[qid as usize].count
}

/// Queue a thread currently waits on, or `INVALID_WAIT_QUEUE_ID`.
pub fn queue_of(tid: ThreadId) -> u32 {
    if (tid as usize) >= MAX_THREADS {
        return INVALID_WAIT_QUEUE_ID;
    }
    WAIT_QUEUES.lock().links[tid as usize].queue
}
