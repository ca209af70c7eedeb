//! Message queue seize/surrender.
//!
//! The concrete blocking object built from the four lower layers: per-queue
//! buffer slab, pending chain (FIFO or priority-keyed), free chain and one
//! wait queue. Receivers block on an empty queue, senders block on a full
//! one — never both at once, so a single wait queue serves both sides.
//!
//! Hand-off is direct in both directions. A surrender that finds a blocked
//! receiver copies straight to it and the message is never visible as
//! pending; a seize that frees a slot while senders are blocked installs the
//! longest-waiting sender's message into that slot immediately. Neither side
//! ever goes through a wake-then-retry cycle, which both removes the retry
//! race and keeps send ordering deterministic.

use cadence_abi::thread::{BlockReason, INVALID_THREAD_ID, MAX_THREADS, ThreadId};
use cadence_abi::Status;
use cadence_lib::{IrqMutex, klog_debug};

use crate::dispatch::DispatchGuard;
use crate::waitq::{self, Discipline};
use crate::{scheduler, thread};

pub const MAX_MESSAGE_QUEUES: usize = 8;
pub const MAX_PENDING_MESSAGES: usize = 16;
pub const MAX_MESSAGE_SIZE: usize = 128;

const NO_SLOT: u32 = u32::MAX;

/// Ordering of pending messages (and of blocked threads on the embedded
/// wait queue).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageDiscipline {
    Fifo,
    Priority,
}

/// Normal sends respect the configured discipline; urgent sends go to the
/// head of the pending chain regardless of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOrder {
    Normal,
    Urgent,
}

#[derive(Clone, Copy)]
struct MessageBuffer {
    next: u32,
    len: usize,
    priority: u32,
    payload: [u8; MAX_MESSAGE_SIZE],
}

impl MessageBuffer {
    const fn empty() -> Self {
        Self {
            next: NO_SLOT,
            len: 0,
            priority: 0,
            payload: [0; MAX_MESSAGE_SIZE],
        }
    }
}

/// Message parked next to a blocked thread: outbound payload for a blocked
/// sender, inbound copy for a directly-satisfied receiver.
#[derive(Clone, Copy)]
struct StagedMessage {
    len: usize,
    priority: u32,
    urgent: bool,
    payload: [u8; MAX_MESSAGE_SIZE],
}

impl StagedMessage {
    const fn empty() -> Self {
        Self {
            len: 0,
            priority: 0,
            urgent: false,
            payload: [0; MAX_MESSAGE_SIZE],
        }
    }
}

struct MessageQueueControl {
    in_use: bool,
    discipline: MessageDiscipline,
    wait_queue: u32,
    pending_head: u32,
    pending_count: u32,
    free_head: u32,
    buffers: [MessageBuffer; MAX_PENDING_MESSAGES],
}

impl MessageQueueControl {
    const fn empty() -> Self {
        Self {
            in_use: false,
            discipline: MessageDiscipline::Fifo,
            wait_queue: waitq::INVALID_WAIT_QUEUE_ID,
            pending_head: NO_SLOT,
            pending_count: 0,
            free_head: NO_SLOT,
            buffers: [MessageBuffer::empty(); MAX_PENDING_MESSAGES],
        }
    }

    fn reset_free_chain(&mut self) {
        self.pending_head = NO_SLOT;
        self.pending_count = 0;
        for index in 0..MAX_PENDING_MESSAGES {
            self.buffers[index] = MessageBuffer::empty();
            self.buffers[index].next = if index + 1 < MAX_PENDING_MESSAGES {
                (index + 1) as u32
            } else {
                NO_SLOT
            };
        }
        self.free_head = 0;
    }

    fn alloc_slot(&mut self) -> Option<u32> {
        let slot = self.free_head;
        if slot == NO_SLOT {
            return None;
        }
        self.free_head = self.buffers[slot as usize].next;
        self.buffers[slot as usize].next = NO_SLOT;
        Some(slot)
    }

    fn free_slot(&mut self, slot: u32) {
        self.buffers[slot as usize].next = self.free_head;
        self.free_head = slot;
    }

    /// Insert into the pending chain. Urgent messages jump to the head no
    /// matter the discipline; normal ones follow it (arrival order, or
    /// ordered by key with arrival tiebreak).
    fn insert_pending(&mut self, slot: u32, urgent: bool) {
        if urgent {
            self.buffers[slot as usize].next = self.pending_head;
            self.pending_head = slot;
            self.pending_count += 1;
            return;
        }

        let key = self.buffers[slot as usize].priority;
        let mut prev = NO_SLOT;
        let mut cursor = self.pending_head;
        while cursor != NO_SLOT {
            let ahead = match self.discipline {
                MessageDiscipline::Fifo => false,
                MessageDiscipline::Priority => key < self.buffers[cursor as usize].priority,
            };
            if ahead {
                break;
            }
            prev = cursor;
            cursor = self.buffers[cursor as usize].next;
        }

        self.buffers[slot as usize].next = cursor;
        if prev == NO_SLOT {
            self.pending_head = slot;
        } else {
            self.buffers[prev as usize].next = slot;
        }
        self.pending_count += 1;
    }

    fn peek_pending(&self) -> Option<u32> {
        (self.pending_head != NO_SLOT).then_some(self.pending_head)
    }

    fn pop_pending(&mut self) -> Option<u32> {
        let head = self.pending_head;
        if head == NO_SLOT {
            return None;
        }
        self.pending_head = self.buffers[head as usize].next;
        self.buffers[head as usize].next = NO_SLOT;
        self.pending_count -= 1;
        Some(head)
    }
}

struct MessageQueueTable {
    queues: [MessageQueueControl; MAX_MESSAGE_QUEUES],
    staging: [StagedMessage; MAX_THREADS],
}

impl MessageQueueTable {
    const fn new() -> Self {
        const QUEUE: MessageQueueControl = MessageQueueControl::empty();
        Self {
            queues: [QUEUE; MAX_MESSAGE_QUEUES],
            staging: [StagedMessage::empty(); MAX_THREADS],
        }
    }

    fn is_live(&self, qid: u32) -> bool {
        (qid as usize) < MAX_MESSAGE_QUEUES && self.queues[qid as usize].in_use
    }
}

static MESSAGE_QUEUES: IrqMutex<MessageQueueTable> = IrqMutex::new(MessageQueueTable::new());

pub fn msgq_initialize() {
    let mut table = MESSAGE_QUEUES.lock();
    *table = MessageQueueTable::new();
}

pub fn message_queue_create(discipline: MessageDiscipline) -> Result<u32, Status> {
    let wait_discipline = match discipline {
        MessageDiscipline::Fifo => Discipline::Fifo,
        MessageDiscipline::Priority => Discipline::Priority,
    };
    let wait_queue = waitq::waitq_create(wait_discipline)?;

    let mut table = MESSAGE_QUEUES.lock();
    let Some(index) = table.queues.iter().position(|q| !q.in_use) else {
        drop(table);
        let _ = waitq::waitq_destroy(wait_queue);
        return Err(Status::TooMany);
    };
    let queue = &mut table.queues[index];
    *queue = MessageQueueControl::empty();
    queue.in_use = true;
    queue.discipline = discipline;
    queue.wait_queue = wait_queue;
    queue.reset_free_chain();
    Ok(index as u32)
}

/// Delete a queue. Every blocked thread resumes with `ObjectWasDeleted`.
pub fn message_queue_delete(qid: u32) -> Status {
    let wait_queue = {
        let mut table = MESSAGE_QUEUES.lock();
        if !table.is_live(qid) {
            return Status::InvalidId;
        }
        let wq = table.queues[qid as usize].wait_queue;
        table.queues[qid as usize] = MessageQueueControl::empty();
        wq
    };
    waitq::waitq_destroy(wait_queue)
}

pub fn pending_count(qid: u32) -> Result<u32, Status> {
    let table = MESSAGE_QUEUES.lock();
    if !table.is_live(qid) {
        return Err(Status::InvalidId);
    }
    Ok(table.queues[qid as usize].pending_count)
}

/// Copy a thread's staged message into `out`, returning its length. Used by
/// the resumption path of a directly-satisfied receiver.
pub fn staged_payload(tid: ThreadId, out: &mut [u8]) -> usize {
    let table = MESSAGE_QUEUES.lock();
    if (tid as usize) >= MAX_THREADS {
        return 0;
    }
    let staged = &table.staging[tid as usize];
    let take = staged.len.min(out.len());
    out[..take].copy_from_slice(&staged.payload[..take]);
    take
}

/// Receive side.
///
/// A pending message is popped per the discipline and copied out, with its
/// ordering key recorded in the caller's wait state; the freed slot goes
/// straight to the longest-waiting blocked sender, if any. With nothing
/// pending, non-blocking callers get `Unsatisfied` and blocking callers
/// suspend on the embedded wait queue with `timeout_ticks`.
pub fn seize(
    qid: u32,
    tid: ThreadId,
    buffer: &mut [u8],
    wait: bool,
    timeout_ticks: u64,
) -> Result<usize, Status> {
    let _guard = DispatchGuard::new();

    let mut sender_to_wake = INVALID_THREAD_ID;
    let mut sender_message = (0usize, 0u32);
    let wait_queue;

    let delivered = {
        let mut table = MESSAGE_QUEUES.lock();
        if !table.is_live(qid) {
            return Err(Status::InvalidId);
        }
        let qidx = qid as usize;
        wait_queue = table.queues[qidx].wait_queue;

        match table.queues[qidx].peek_pending() {
            Some(slot) => {
                let len = table.queues[qidx].buffers[slot as usize].len;
                if buffer.len() < len {
                    return Err(Status::InvalidSize);
                }
                table.queues[qidx].pop_pending();
                buffer[..len].copy_from_slice(&table.queues[qidx].buffers[slot as usize].payload[..len]);
                let priority = table.queues[qidx].buffers[slot as usize].priority;
                table.queues[qidx].free_slot(slot);

                // Only senders can be blocked while messages are pending;
                // hand the freed slot to the longest-waiting one instead of
                // leaving it on the free pool.
                if let Some(sender) = waitq::dequeue(wait_queue) {
                    let staged = table.staging[sender as usize];
                    if let Some(fresh) = table.queues[qidx].alloc_slot() {
                        let buf = &mut table.queues[qidx].buffers[fresh as usize];
                        buf.len = staged.len;
                        buf.priority = staged.priority;
                        buf.payload[..staged.len].copy_from_slice(&staged.payload[..staged.len]);
                        table.queues[qidx].insert_pending(fresh, staged.urgent);
                    }
                    sender_to_wake = sender;
                    sender_message = (staged.len, staged.priority);
                }
                Some((len, priority))
            }
            None => None,
        }
    };

    if let Some((len, priority)) = delivered {
        thread::set_wait_message(tid, len, priority);
        if sender_to_wake != INVALID_THREAD_ID {
            thread::set_wait_message(sender_to_wake, sender_message.0, sender_message.1);
            thread::set_wait_status(sender_to_wake, Status::Successful);
            scheduler::unblock(sender_to_wake);
        }
        return Ok(len);
    }

    if !wait {
        return Err(Status::Unsatisfied);
    }

    thread::set_block_reason(tid, BlockReason::MessageSeize);
    thread::set_wait_message(tid, 0, 0);
    waitq::enqueue(wait_queue, tid, timeout_ticks);

    // Resumed: a surrendering thread staged the payload and filled in the
    // wait state, or a timeout/deletion left its status instead.
    let status = thread::wait_status(tid);
    if !status.is_successful() {
        return Err(status);
    }
    let (len, _priority) = thread::wait_message(tid);
    if buffer.len() < len {
        return Err(Status::InvalidSize);
    }
    staged_payload(tid, buffer);
    Ok(len)
}

/// Send side.
///
/// Delivers directly to a blocked receiver when the queue is empty (the
/// message is never visible as pending), otherwise inserts per the
/// discipline — urgent sends go to the head regardless of it. A full queue
/// turns non-blocking callers away with `Unsatisfied`; blocking callers
/// stage their payload and suspend until a receiver frees a slot for them.
pub fn surrender(
    qid: u32,
    tid: ThreadId,
    payload: &[u8],
    priority: u32,
    order: SubmitOrder,
    wait: bool,
    timeout_ticks: u64,
) -> Status {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Status::InvalidSize;
    }

    let _guard = DispatchGuard::new();

    enum Outcome {
        DirectDelivery(ThreadId),
        Queued,
        Full,
    }

    fn install(
        queue: &mut MessageQueueControl,
        payload: &[u8],
        priority: u32,
        order: SubmitOrder,
    ) -> Outcome {
        match queue.alloc_slot() {
            Some(slot) => {
                let buf = &mut queue.buffers[slot as usize];
                buf.len = payload.len();
                buf.priority = priority;
                buf.payload[..payload.len()].copy_from_slice(payload);
                queue.insert_pending(slot, matches!(order, SubmitOrder::Urgent));
                Outcome::Queued
            }
            None => Outcome::Full,
        }
    }

    let wait_queue;
    let outcome = {
        let mut table = MESSAGE_QUEUES.lock();
        if !table.is_live(qid) {
            return Status::InvalidId;
        }
        let qidx = qid as usize;
        wait_queue = table.queues[qidx].wait_queue;

        if table.queues[qidx].pending_count == 0 {
            if let Some(receiver) = waitq::dequeue(wait_queue) {
                let staged = &mut table.staging[receiver as usize];
                staged.len = payload.len();
                staged.priority = priority;
                staged.urgent = false;
                staged.payload[..payload.len()].copy_from_slice(payload);
                Outcome::DirectDelivery(receiver)
            } else {
                install(&mut table.queues[qidx], payload, priority, order)
            }
        } else {
            install(&mut table.queues[qidx], payload, priority, order)
        }
    };

    match outcome {
        Outcome::DirectDelivery(receiver) => {
            thread::set_wait_message(receiver, payload.len(), priority);
            thread::set_wait_status(receiver, Status::Successful);
            scheduler::unblock(receiver);
            Status::Successful
        }
        Outcome::Queued => Status::Successful,
        Outcome::Full => {
            if !wait {
                return Status::Unsatisfied;
            }
            {
                let mut table = MESSAGE_QUEUES.lock();
                let staged = &mut table.staging[tid as usize];
                staged.len = payload.len();
                staged.priority = priority;
                staged.urgent = matches!(order, SubmitOrder::Urgent);
                staged.payload[..payload.len()].copy_from_slice(payload);
            }
            thread::set_block_reason(tid, BlockReason::MessageSurrender);
            waitq::enqueue(wait_queue, tid, timeout_ticks);

            // Resumed once a seize installed the staged message (or a
            // timeout/deletion decided otherwise).
            thread::wait_status(tid)
        }
    }
}

/// Satisfy every blocked receiver with one message, queueing nothing.
/// Returns the number of receivers satisfied (zero when none were waiting).
pub fn broadcast(qid: u32, payload: &[u8], priority: u32) -> Result<u32, Status> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(Status::InvalidSize);
    }

    let _guard = DispatchGuard::new();

    let mut receivers = [INVALID_THREAD_ID; MAX_THREADS];
    let mut count = 0usize;
    {
        let mut table = MESSAGE_QUEUES.lock();
        if !table.is_live(qid) {
            return Err(Status::InvalidId);
        }
        let qidx = qid as usize;
        if table.queues[qidx].pending_count != 0 {
            // Messages pending means nobody is blocked receiving.
            return Ok(0);
        }
        let wait_queue = table.queues[qidx].wait_queue;
        while let Some(receiver) = waitq::dequeue(wait_queue) {
            let staged = &mut table.staging[receiver as usize];
            staged.len = payload.len();
            staged.priority = priority;
            staged.urgent = false;
            staged.payload[..payload.len()].copy_from_slice(payload);
            receivers[count] = receiver;
            count += 1;
        }
    }

    for receiver in receivers.iter().take(count) {
        thread::set_wait_message(*receiver, payload.len(), priority);
        thread::set_wait_status(*receiver, Status::Successful);
        scheduler::unblock(*receiver);
    }
    Ok(count as u32)
}

/// Discard every pending message. Freed slots are handed to blocked senders
/// in wait order, exactly as on the seize path. Returns the number of
/// messages discarded.
pub fn flush_pending(qid: u32) -> Result<u32, Status> {
    let _guard = DispatchGuard::new();

    let mut woken = [INVALID_THREAD_ID; MAX_THREADS];
    let mut woken_messages = [(0usize, 0u32); MAX_THREADS];
    let mut woken_count = 0usize;

    let flushed = {
        let mut table = MESSAGE_QUEUES.lock();
        if !table.is_live(qid) {
            return Err(Status::InvalidId);
        }
        let qidx = qid as usize;
        let wait_queue = table.queues[qidx].wait_queue;

        let mut flushed = 0;
        while let Some(slot) = table.queues[qidx].pop_pending() {
            table.queues[qidx].free_slot(slot);
            flushed += 1;
        }

        // The flush may have freed room for blocked senders.
        while table.queues[qidx].free_head != NO_SLOT {
            let Some(sender) = waitq::dequeue(wait_queue) else {
                break;
            };
            let staged = table.staging[sender as usize];
            if let Some(slot) = table.queues[qidx].alloc_slot() {
                let buf = &mut table.queues[qidx].buffers[slot as usize];
                buf.len = staged.len;
                buf.priority = staged.priority;
                buf.payload[..staged.len].copy_from_slice(&staged.payload[..staged.len]);
                table.queues[qidx].insert_pending(slot, staged.urgent);
            }
            woken[woken_count] = sender;
            woken_messages[woken_count] = (staged.len, staged.priority);
            woken_count += 1;
        }
        flushed
    };

    for index in 0..woken_count {
        let sender = woken[index];
        thread::set_wait_message(sender, woken_messages[index].0, woken_messages[index].1);
        thread::set_wait_status(sender, Status::Successful);
        scheduler::unblock(sender);
    }

    if flushed > 0 {
        klog_debug!("MSGQ: flushed {} pending message(s) from queue {}", flushed, qid);
    }
    Ok(flushed)
}
