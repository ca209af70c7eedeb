//! Thread table.
//!
//! Fixed slab of thread control records, indexed by `ThreadId`. Wait queues,
//! the scheduler and the resource forest reference threads by id and never
//! own them; slot reclamation happens only through `thread_delete`.

use cadence_lib::IrqMutex;
use cadence_lib::{klog_debug, klog_warn};

pub use cadence_abi::thread::{
    BlockReason, INVALID_THREAD_ID, MAX_THREADS, PRIORITY_COUNT, Priority, THREAD_NAME_MAX_LEN,
    ThreadId, ThreadState,
};
use cadence_abi::Status;

/// Wait-related fields of a thread, written by the blocking object the
/// thread is suspended on and read back by the thread after resumption.
#[derive(Clone, Copy)]
pub struct WaitInfo {
    /// Wait queue the thread is enqueued on, or `INVALID_THREAD_ID`.
    pub queue: u32,
    /// Outcome delivered to the thread when it resumes.
    pub return_status: Status,
    pub block_reason: BlockReason,
    /// Size of the message delivered on a satisfied seize.
    pub message_size: usize,
    /// Priority/ordering key of the delivered message.
    pub message_priority: u32,
}

impl WaitInfo {
    const fn new() -> Self {
        Self {
            queue: INVALID_THREAD_ID,
            return_status: Status::Successful,
            block_reason: BlockReason::None,
            message_size: 0,
            message_priority: 0,
        }
    }
}

pub struct ThreadControl {
    pub id: ThreadId,
    name: [u8; THREAD_NAME_MAX_LEN],
    name_len: usize,
    pub state: ThreadState,
    /// Effective priority, including any inheritance boost.
    pub current_priority: Priority,
    /// Priority assigned at creation / by explicit priority change.
    pub real_priority: Priority,
    pub wait: WaitInfo,
}

impl ThreadControl {
    const fn empty() -> Self {
        Self {
            id: INVALID_THREAD_ID,
            name: [0; THREAD_NAME_MAX_LEN],
            name_len: 0,
            state: ThreadState::Invalid,
            current_priority: 0,
            real_priority: 0,
            wait: WaitInfo::new(),
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("<non-utf8>")
    }
}

struct ThreadTable {
    slots: [ThreadControl; MAX_THREADS],
    count: u32,
}

impl ThreadTable {
    const fn new() -> Self {
        const EMPTY: ThreadControl = ThreadControl::empty();
        Self {
            slots: [EMPTY; MAX_THREADS],
            count: 0,
        }
    }
}

static THREADS: IrqMutex<ThreadTable> = IrqMutex::new(ThreadTable::new());

/// Reset the thread table to its boot state.
pub fn thread_initialize() {
    let mut table = THREADS.lock();
    *table = ThreadTable::new();
}

/// Create a thread in the `Ready` state. The platform layer owns stacks and
/// register contexts; this table records only what the core needs.
pub fn thread_create(name: &str, priority: Priority) -> Result<ThreadId, Status> {
    if priority as usize >= PRIORITY_COUNT {
        return Err(Status::InvalidPriority);
    }

    let mut table = THREADS.lock();
    let slot_index = table
        .slots
        .iter()
        .position(|slot| slot.state == ThreadState::Invalid);
    let Some(index) = slot_index else {
        return Err(Status::TooMany);
    };

    let id = index as ThreadId;
    let slot = &mut table.slots[index];
    *slot = ThreadControl::empty();
    slot.id = id;
    slot.state = ThreadState::Ready;
    slot.current_priority = priority;
    slot.real_priority = priority;

    let bytes = name.as_bytes();
    let take = bytes.len().min(THREAD_NAME_MAX_LEN);
    slot.name[..take].copy_from_slice(&bytes[..take]);
    slot.name_len = take;

    table.count += 1;
    drop(table);

    klog_debug!("THREAD: created '{}' id {} priority {}", name, id, priority);
    Ok(id)
}

/// Delete a thread: pull it out of any wait queue (without a resumption
/// status — there is nobody left to observe one), disarm its timeout,
/// remove it from the scheduler and reclaim the slot.
pub fn thread_delete(tid: ThreadId) -> Status {
    if state_of(tid) == ThreadState::Invalid {
        return Status::InvalidId;
    }

    crate::watchdog::cancel(tid);
    crate::waitq::extract(tid);
    crate::scheduler::extract(tid);

    let mut table = THREADS.lock();
    let Some(slot) = slot_mut(&mut table, tid) else {
        return Status::InvalidId;
    };
    *slot = ThreadControl::empty();
    table.count = table.count.saturating_sub(1);
    Status::Successful
}

fn slot_mut(table: &mut ThreadTable, tid: ThreadId) -> Option<&mut ThreadControl> {
    let index = tid as usize;
    if index >= MAX_THREADS {
        return None;
    }
    let slot = &mut table.slots[index];
    if slot.state == ThreadState::Invalid {
        return None;
    }
    Some(slot)
}

/// Run `f` against a live thread's control record.
pub fn with_thread<R>(tid: ThreadId, f: impl FnOnce(&mut ThreadControl) -> R) -> Option<R> {
    let mut table = THREADS.lock();
    slot_mut(&mut table, tid).map(f)
}

pub fn thread_count() -> u32 {
    THREADS.lock().count
}

pub fn priority_of(tid: ThreadId) -> Option<Priority> {
    with_thread(tid, |t| t.current_priority)
}

pub fn real_priority_of(tid: ThreadId) -> Option<Priority> {
    with_thread(tid, |t| t.real_priority)
}

pub fn state_of(tid: ThreadId) -> ThreadState {
    with_thread(tid, |t| t.state).unwrap_or(ThreadState::Invalid)
}

/// Transition a thread's state, enforcing the state machine.
pub fn set_state(tid: ThreadId, target: ThreadState) -> Status {
    let mut table = THREADS.lock();
    let Some(slot) = slot_mut(&mut table, tid) else {
        return Status::InvalidId;
    };
    if slot.state == target {
        return Status::Successful;
    }
    if !slot.state.can_transition_to(target) {
        let from = slot.state;
        drop(table);
        klog_warn!(
            "THREAD: rejected transition {:?} -> {:?} for thread {}",
            from,
            target,
            tid
        );
        return Status::Unsatisfied;
    }
    slot.state = target;
    Status::Successful
}

/// Effective-priority update, used by the inheritance protocol. The real
/// priority is untouched.
pub fn set_current_priority(tid: ThreadId, priority: Priority) -> Status {
    match with_thread(tid, |t| t.current_priority = priority) {
        Some(()) => Status::Successful,
        None => Status::InvalidId,
    }
}

// --- Wait info accessors ---------------------------------------------------

pub fn set_wait_queue(tid: ThreadId, queue: u32) {
    let _ = with_thread(tid, |t| t.wait.queue = queue);
}

pub fn wait_queue_of(tid: ThreadId) -> u32 {
    with_thread(tid, |t| t.wait.queue).unwrap_or(INVALID_THREAD_ID)
}

pub fn set_wait_status(tid: ThreadId, status: Status) {
    let _ = with_thread(tid, |t| t.wait.return_status = status);
}

pub fn wait_status(tid: ThreadId) -> Status {
    with_thread(tid, |t| t.wait.return_status).unwrap_or(Status::InvalidId)
}

pub fn set_block_reason(tid: ThreadId, reason: BlockReason) {
    let _ = with_thread(tid, |t| t.wait.block_reason = reason);
}

pub fn block_reason_of(tid: ThreadId) -> BlockReason {
    with_thread(tid, |t| t.wait.block_reason).unwrap_or(BlockReason::None)
}

pub fn set_wait_message(tid: ThreadId, size: usize, priority: u32) {
    let _ = with_thread(tid, |t| {
        t.wait.message_size = size;
        t.wait.message_priority = priority;
    });
}

pub fn wait_message(tid: ThreadId) -> (usize, u32) {
    with_thread(tid, |t| (t.wait.message_size, t.wait.message_priority)).unwrap_or((0, 0))
}

// --- Context-switch bookkeeping --------------------------------------------

/// Record that `next` is taking over a processor from `prev`. The scheduler
/// already decided both sides; this only settles the Running/Ready split.
pub fn note_context_switch(prev: ThreadId, next: ThreadId) {
    if prev == next {
        return;
    }
    if prev != INVALID_THREAD_ID && state_of(prev) == ThreadState::Running {
        let _ = set_state(prev, ThreadState::Ready);
    }
    if next != INVALID_THREAD_ID {
        let _ = set_state(next, ThreadState::Running);
    }
}
