//! Uniprocessor priority policy.
//!
//! One ready structure: a bitmap over the priority levels plus a FIFO chain
//! per level. Selection of the highest-priority ready thread is O(1) via the
//! bitmap. The executing thread stays in the structure while it runs, so the
//! heir is always simply the head of the highest non-empty level.

use cadence_abi::thread::{INVALID_THREAD_ID, MAX_THREADS, PRIORITY_COUNT, Priority, ThreadId};
use cadence_lib::percpu;

pub struct PriorityScheduler {
    bitmap: u64,
    heads: [u32; PRIORITY_COUNT],
    tails: [u32; PRIORITY_COUNT],
    links: [u32; MAX_THREADS],
    queued: [bool; MAX_THREADS],
    prio_of: [Priority; MAX_THREADS],
    idle_thread: u32,
    ready_count: u32,
}

impl PriorityScheduler {
    pub const fn new() -> Self {
        Self {
            bitmap: 0,
            heads: [INVALID_THREAD_ID; PRIORITY_COUNT],
            tails: [INVALID_THREAD_ID; PRIORITY_COUNT],
            links: [INVALID_THREAD_ID; MAX_THREADS],
            queued: [false; MAX_THREADS],
            prio_of: [0; MAX_THREADS],
            idle_thread: INVALID_THREAD_ID,
            ready_count: 0,
        }
    }

    #[inline]
    pub fn contains(&self, tid: ThreadId) -> bool {
        (tid as usize) < MAX_THREADS && self.queued[tid as usize]
    }

    #[inline]
    pub fn ready_count(&self) -> u32 {
        self.ready_count
    }

    pub fn set_idle(&mut self, tid: ThreadId) {
        self.idle_thread = tid;
    }

    /// Head of the highest non-empty priority level.
    pub fn highest_ready(&self) -> Option<ThreadId> {
        if self.bitmap == 0 {
            return None;
        }
        let level = self.bitmap.trailing_zeros() as usize;
        Some(self.heads[level])
    }

    /// Append at the tail of the thread's priority level (normal arrival).
    pub fn insert_fifo(&mut self, tid: ThreadId, priority: Priority) {
        if self.contains(tid) {
            return;
        }
        let level = priority as usize;
        let index = tid as usize;
        self.links[index] = INVALID_THREAD_ID;
        if self.heads[level] == INVALID_THREAD_ID {
            self.heads[level] = tid;
        } else {
            self.links[self.tails[level] as usize] = tid;
        }
        self.tails[level] = tid;
        self.bitmap |= 1 << level;
        self.queued[index] = true;
        self.prio_of[index] = priority;
        self.ready_count += 1;
    }

    /// Insert at the head of the thread's priority level ("jump the queue").
    pub fn insert_lifo(&mut self, tid: ThreadId, priority: Priority) {
        if self.contains(tid) {
            return;
        }
        let level = priority as usize;
        let index = tid as usize;
        self.links[index] = self.heads[level];
        if self.heads[level] == INVALID_THREAD_ID {
            self.tails[level] = tid;
        }
        self.heads[level] = tid;
        self.bitmap |= 1 << level;
        self.queued[index] = true;
        self.prio_of[index] = priority;
        self.ready_count += 1;
    }

    /// Remove a thread from the ready structure. `false` when absent.
    pub fn remove(&mut self, tid: ThreadId) -> bool {
        if !self.contains(tid) {
            return false;
        }
        let index = tid as usize;
        let level = self.prio_of[index] as usize;

        let mut prev = INVALID_THREAD_ID;
        let mut cursor = self.heads[level];
        while cursor != INVALID_THREAD_ID {
            if cursor == tid {
                let next = self.links[index];
                if prev == INVALID_THREAD_ID {
                    self.heads[level] = next;
                } else {
                    self.links[prev as usize] = next;
                }
                if self.tails[level] == tid {
                    self.tails[level] = prev;
                }
                break;
            }
            prev = cursor;
            cursor = self.links[cursor as usize];
        }

        if self.heads[level] == INVALID_THREAD_ID {
            self.bitmap &= !(1 << level);
            self.tails[level] = INVALID_THREAD_ID;
        }
        self.links[index] = INVALID_THREAD_ID;
        self.queued[index] = false;
        self.ready_count -= 1;
        true
    }

    /// Re-evaluate the heir after any ready-structure change. A switch is
    /// flagged only when the choice differs from the executing thread.
    pub fn reschedule(&mut self) {
        let control = percpu::per_cpu(0);
        let heir = self.highest_ready().unwrap_or(self.idle_thread);
        if heir == INVALID_THREAD_ID {
            return;
        }
        control.set_heir(heir);
        control.set_dispatch_needed(heir != control.executing());
    }
}
