//! SMP priority policy.
//!
//! Two structures: a priority-ordered ready sequence and a scheduled set
//! holding exactly one thread per processor. Every enqueue and extract may
//! exchange a thread between the two — a higher-priority arrival evicts the
//! lowest-priority scheduled thread back to ready, and a departure pulls the
//! highest ready thread onto the freed processor. Insertion cost is
//! O(ready-set size); this policy trades that for simplicity and a small,
//! auditable invariant. The cooperative thread-mode flag is ignored here:
//! under this policy every thread is always preemptible.

use cadence_abi::thread::{INVALID_THREAD_ID, MAX_THREADS, Priority, ThreadId};
use cadence_lib::kernel_services::platform;
use cadence_lib::percpu::{self, MAX_CPUS};

pub enum EnqueueOutcome {
    /// Inserted into the ready sequence; nothing scheduled changed.
    Queued,
    /// Took an idle processor.
    Scheduled { cpu: usize },
    /// Displaced the lowest-priority scheduled thread back to ready.
    Evicted { victim: ThreadId, cpu: usize },
}

pub enum ExtractOutcome {
    NotFound,
    FromReady,
    FromScheduled {
        cpu: usize,
        replacement: Option<ThreadId>,
    },
}

pub struct SmpScheduler {
    cpu_count: usize,
    ready_head: u32,
    links: [u32; MAX_THREADS],
    in_ready: [bool; MAX_THREADS],
    prio_of: [Priority; MAX_THREADS],
    scheduled: [u32; MAX_CPUS],
    assigned_cpu: [u32; MAX_THREADS],
    ready_count: u32,
}

impl SmpScheduler {
    pub const fn new(cpu_count: usize) -> Self {
        Self {
            cpu_count,
            ready_head: INVALID_THREAD_ID,
            links: [INVALID_THREAD_ID; MAX_THREADS],
            in_ready: [false; MAX_THREADS],
            prio_of: [0; MAX_THREADS],
            scheduled: [INVALID_THREAD_ID; MAX_CPUS],
            assigned_cpu: [INVALID_THREAD_ID; MAX_THREADS],
            ready_count: 0,
        }
    }

    #[inline]
    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    #[inline]
    pub fn ready_count(&self) -> u32 {
        self.ready_count
    }

    #[inline]
    pub fn is_scheduled(&self, tid: ThreadId) -> bool {
        (tid as usize) < MAX_THREADS && self.assigned_cpu[tid as usize] != INVALID_THREAD_ID
    }

    #[inline]
    pub fn contains(&self, tid: ThreadId) -> bool {
        (tid as usize) < MAX_THREADS
            && (self.in_ready[tid as usize] || self.is_scheduled(tid))
    }

    pub fn scheduled_snapshot(&self, out: &mut [ThreadId]) -> usize {
        let mut count = 0;
        for cpu in 0..self.cpu_count {
            let tid = self.scheduled[cpu];
            if tid != INVALID_THREAD_ID && count < out.len() {
                out[count] = tid;
                count += 1;
            }
        }
        count
    }

    fn insert_ready(&mut self, tid: ThreadId, priority: Priority, ahead_of_equals: bool) {
        let index = tid as usize;
        self.prio_of[index] = priority;
        self.in_ready[index] = true;

        let mut prev = INVALID_THREAD_ID;
        let mut cursor = self.ready_head;
        while cursor != INVALID_THREAD_ID {
            let cursor_prio = self.prio_of[cursor as usize];
            let goes_before = if ahead_of_equals {
                priority <= cursor_prio
            } else {
                priority < cursor_prio
            };
            if goes_before {
                break;
            }
            prev = cursor;
            cursor = self.links[cursor as usize];
        }

        self.links[index] = cursor;
        if prev == INVALID_THREAD_ID {
            self.ready_head = tid;
        } else {
            self.links[prev as usize] = tid;
        }
        self.ready_count += 1;
    }

    fn remove_ready(&mut self, tid: ThreadId) -> bool {
        let index = tid as usize;
        if !self.in_ready[index] {
            return false;
        }
        let mut prev = INVALID_THREAD_ID;
        let mut cursor = self.ready_head;
        while cursor != INVALID_THREAD_ID {
            if cursor == tid {
                let next = self.links[index];
                if prev == INVALID_THREAD_ID {
                    self.ready_head = next;
                } else {
                    self.links[prev as usize] = next;
                }
                self.links[index] = INVALID_THREAD_ID;
                self.in_ready[index] = false;
                self.ready_count -= 1;
                return true;
            }
            prev = cursor;
            cursor = self.links[cursor as usize];
        }
        false
    }

    fn pop_highest_ready(&mut self) -> Option<ThreadId> {
        let head = self.ready_head;
        if head == INVALID_THREAD_ID {
            return None;
        }
        self.remove_ready(head);
        Some(head)
    }

    /// Place `tid` on `cpu` and flag the hand-off there.
    fn allocate_processor(&mut self, tid: ThreadId, cpu: usize) {
        self.scheduled[cpu] = tid;
        self.assigned_cpu[tid as usize] = cpu as u32;

        let control = percpu::per_cpu(cpu);
        control.set_heir(tid);
        control.set_dispatch_needed(tid != control.executing());
        if cpu != percpu::current_processor_index() {
            platform::reschedule_ipi(cpu);
        }
    }

    fn release_processor(&mut self, tid: ThreadId) -> usize {
        let cpu = self.assigned_cpu[tid as usize] as usize;
        self.scheduled[cpu] = INVALID_THREAD_ID;
        self.assigned_cpu[tid as usize] = INVALID_THREAD_ID;
        cpu
    }

    /// Lowest-priority scheduled thread; ties resolved toward the highest
    /// processor index so the choice is deterministic.
    fn lowest_scheduled(&self) -> Option<(ThreadId, usize)> {
        let mut lowest: Option<(ThreadId, usize)> = None;
        for cpu in 0..self.cpu_count {
            let tid = self.scheduled[cpu];
            if tid == INVALID_THREAD_ID {
                continue;
            }
            let keep = match lowest {
                None => true,
                Some((best, _)) => {
                    self.prio_of[tid as usize] >= self.prio_of[best as usize]
                }
            };
            if keep {
                lowest = Some((tid, cpu));
            }
        }
        lowest
    }

    fn free_processor(&self) -> Option<usize> {
        (0..self.cpu_count).find(|&cpu| self.scheduled[cpu] == INVALID_THREAD_ID)
    }

    pub fn enqueue(
        &mut self,
        tid: ThreadId,
        priority: Priority,
        ahead_of_equals: bool,
    ) -> EnqueueOutcome {
        if self.contains(tid) {
            return EnqueueOutcome::Queued;
        }
        self.prio_of[tid as usize] = priority;

        if let Some(cpu) = self.free_processor() {
            self.allocate_processor(tid, cpu);
            return EnqueueOutcome::Scheduled { cpu };
        }

        if let Some((victim, cpu)) = self.lowest_scheduled() {
            if priority < self.prio_of[victim as usize] {
                self.release_processor(victim);
                // The displaced thread was already entitled to run, so it
                // goes ahead of equal-priority arrivals.
                self.insert_ready(victim, self.prio_of[victim as usize], true);
                self.allocate_processor(tid, cpu);
                return EnqueueOutcome::Evicted { victim, cpu };
            }
        }

        self.insert_ready(tid, priority, ahead_of_equals);
        EnqueueOutcome::Queued
    }

    pub fn extract(&mut self, tid: ThreadId) -> ExtractOutcome {
        if self.is_scheduled(tid) {
            let cpu = self.release_processor(tid);
            let replacement = self.pop_highest_ready();
            match replacement {
                Some(next) => self.allocate_processor(next, cpu),
                None => {
                    let control = percpu::per_cpu(cpu);
                    let idle = control.idle_thread();
                    control.set_heir(idle);
                    control.set_dispatch_needed(
                        idle != INVALID_THREAD_ID && idle != control.executing(),
                    );
                    if cpu != percpu::current_processor_index() {
                        platform::reschedule_ipi(cpu);
                    }
                }
            }
            return ExtractOutcome::FromScheduled { cpu, replacement };
        }

        if self.remove_ready(tid) {
            return ExtractOutcome::FromReady;
        }
        ExtractOutcome::NotFound
    }

    /// Surrender the processor to an equal-priority peer, if any.
    pub fn yield_thread(&mut self, tid: ThreadId) {
        if self.is_scheduled(tid) {
            let cpu = self.release_processor(tid);
            self.insert_ready(tid, self.prio_of[tid as usize], false);
            if let Some(next) = self.pop_highest_ready() {
                self.allocate_processor(next, cpu);
            }
        } else if self.remove_ready(tid) {
            self.insert_ready(tid, self.prio_of[tid as usize], false);
        }
    }
}
