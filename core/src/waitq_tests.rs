//! Wait-queue protocol tests: disciplines, membership disjointness,
//! timeout racing and flush semantics.

use cadence_abi::thread::{NO_TIMEOUT, ThreadState};
use cadence_abi::Status;
use cadence_lib::fail;
use cadence_lib::testing::TestResult;

use crate::test_support::{CoreFixture, spawn};
use crate::waitq::{self, Discipline, INVALID_WAIT_QUEUE_ID};
use crate::{thread, watchdog};

pub fn test_fifo_discipline_preserves_arrival_order() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let queue = match waitq::waitq_create(Discipline::Fifo) {
        Ok(queue) => queue,
        Err(status) => return fail!("queue create failed: {:?}", status),
    };

    let a = spawn("a", 10);
    let b = spawn("b", 1);
    let c = spawn("c", 30);
    for tid in [a, b, c] {
        waitq::enqueue(queue, tid, NO_TIMEOUT);
    }

    for expected in [a, b, c] {
        if waitq::dequeue(queue) != Some(expected) {
            return fail!("fifo dequeue must follow arrival order");
        }
    }
    TestResult::Pass
}

/// Priority discipline with arrival-order tiebreak: T1(5), T2(5), T3(3)
/// arriving in that order leave as T3, T1, T2.
pub fn test_priority_discipline_with_arrival_tiebreak() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let queue = match waitq::waitq_create(Discipline::Priority) {
        Ok(queue) => queue,
        Err(status) => return fail!("queue create failed: {:?}", status),
    };

    let t1 = spawn("t1", 5);
    let t2 = spawn("t2", 5);
    let t3 = spawn("t3", 3);
    for tid in [t1, t2, t3] {
        waitq::enqueue(queue, tid, NO_TIMEOUT);
    }

    for expected in [t3, t1, t2] {
        if waitq::dequeue(queue) != Some(expected) {
            return fail!("priority dequeue must order by urgency, then arrival");
        }
    }
    TestResult::Pass
}

/// A thread occupies at most one queue; membership moves, never aliases.
pub fn test_queue_membership_is_disjoint() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let first = waitq::waitq_create(Discipline::Fifo).unwrap_or(INVALID_WAIT_QUEUE_ID);
    let second = waitq::waitq_create(Discipline::Fifo).unwrap_or(INVALID_WAIT_QUEUE_ID);

    let a = spawn("a", 10);
    let b = spawn("b", 10);
    waitq::enqueue(first, a, NO_TIMEOUT);
    waitq::enqueue(second, b, NO_TIMEOUT);

    if waitq::queue_of(a) != first || waitq::queue_of(b) != second {
        return fail!("membership must name exactly the queue enqueued on");
    }
    if waitq::queue_count(first) != 1 || waitq::queue_count(second) != 1 {
        return fail!("each queue must see exactly its own waiter");
    }

    if !waitq::extract(a) {
        return fail!("extract of a queued thread must succeed");
    }
    if waitq::queue_of(a) != INVALID_WAIT_QUEUE_ID {
        return fail!("extracted thread must not be queued anywhere");
    }
    if waitq::queue_count(second) != 1 {
        return fail!("extraction must not disturb other queues");
    }
    TestResult::Pass
}

pub fn test_extract_not_present_is_defined_noop() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let loner = spawn("loner", 10);

    if waitq::extract(loner) {
        return fail!("extract of a never-queued thread must report not-found");
    }
    if waitq::extract(u32::MAX) {
        return fail!("extract of an invalid id must report not-found");
    }
    TestResult::Pass
}

/// The watchdog side loses the race once the thread has been satisfied:
/// re-validation under the lock turns the callback into a no-op.
pub fn test_timeout_loser_is_noop_after_satisfaction() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let queue = waitq::waitq_create(Discipline::Fifo).unwrap_or(INVALID_WAIT_QUEUE_ID);

    let waiter = spawn("waiter", 10);
    waitq::enqueue(queue, waiter, 25);
    if !watchdog::is_armed(waiter) {
        return fail!("a finite timeout must arm the watchdog");
    }

    // Satisfaction wins the race.
    if waitq::dequeue(queue) != Some(waiter) {
        return fail!("dequeue must return the waiter");
    }
    thread::set_wait_status(waiter, Status::Successful);
    if watchdog::is_armed(waiter) {
        return fail!("satisfaction must cancel the timeout");
    }

    // The stale callback must re-validate and do nothing.
    waitq::timeout_expired(waiter);
    if thread::wait_status(waiter) != Status::Successful {
        return fail!("losing timeout must not overwrite the satisfied status");
    }
    TestResult::Pass
}

pub fn test_timeout_fires_when_still_queued() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let queue = waitq::waitq_create(Discipline::Fifo).unwrap_or(INVALID_WAIT_QUEUE_ID);

    let waiter = spawn("waiter", 10);
    waitq::enqueue(queue, waiter, 25);
    if thread::state_of(waiter) != ThreadState::Blocked {
        return fail!("enqueued thread must be blocked");
    }

    watchdog::watchdog_tick(25);

    if thread::wait_status(waiter) != Status::Timeout {
        return fail!("expiry must deliver the timeout status");
    }
    if waitq::queue_of(waiter) != INVALID_WAIT_QUEUE_ID {
        return fail!("expired thread must leave the queue");
    }
    if thread::state_of(waiter) != ThreadState::Ready {
        return fail!("expired thread must be runnable again");
    }
    TestResult::Pass
}

pub fn test_flush_resumes_all_with_status() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let queue = waitq::waitq_create(Discipline::Fifo).unwrap_or(INVALID_WAIT_QUEUE_ID);

    let a = spawn("a", 10);
    let b = spawn("b", 11);
    let c = spawn("c", 12);
    for tid in [a, b, c] {
        waitq::enqueue(queue, tid, NO_TIMEOUT);
    }

    if waitq::flush(queue, Status::ObjectWasDeleted) != 3 {
        return fail!("flush must resume every waiter");
    }
    for tid in [a, b, c] {
        if thread::wait_status(tid) != Status::ObjectWasDeleted {
            return fail!("flushed thread must observe the deletion status");
        }
        if thread::state_of(tid) != ThreadState::Ready {
            return fail!("flushed thread must be runnable");
        }
    }
    if waitq::queue_count(queue) != 0 {
        return fail!("flushed queue must be empty");
    }
    TestResult::Pass
}

/// Priority changes re-place a waiter but keep its arrival stamp, so the
/// tiebreak among equals stays stable.
pub fn test_requeue_preserves_arrival_tiebreak() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let queue = waitq::waitq_create(Discipline::Priority).unwrap_or(INVALID_WAIT_QUEUE_ID);

    let early = spawn("early", 10);
    let late = spawn("late", 20);
    waitq::enqueue(queue, early, NO_TIMEOUT);
    waitq::enqueue(queue, late, NO_TIMEOUT);

    // Boost the later arrival to the earlier one's priority: the earlier
    // arrival still dequeues first.
    waitq::requeue(late, 10);
    if waitq::dequeue(queue) != Some(early) {
        return fail!("equal priorities must break ties by arrival");
    }
    if waitq::dequeue(queue) != Some(late) {
        return fail!("requeued thread must still be present");
    }
    TestResult::Pass
}

cadence_lib::define_test_suite!(
    waitq,
    [
        test_fifo_discipline_preserves_arrival_order,
        test_priority_discipline_with_arrival_tiebreak,
        test_queue_membership_is_disjoint,
        test_extract_not_present_is_defined_noop,
        test_timeout_loser_is_noop_after_satisfaction,
        test_timeout_fires_when_still_queued,
        test_flush_resumes_all_with_status,
        test_requeue_preserves_arrival_tiebreak,
    ]
);
