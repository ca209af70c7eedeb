//! Semaphore suite: the cross-component scenarios that exercise the wait
//! queue, scheduler, resource forest and dispatch controller together.

use cadence_abi::thread::{NO_TIMEOUT, ThreadState};
use cadence_abi::Status;
use cadence_core::sem::{self, SemaphoreKind};
use cadence_core::test_support::{CoreFixture, executing_on, install_idle, settle, spawn_ready};
use cadence_core::waitq::Discipline;
use cadence_core::{resource, thread, watchdog};
use cadence_lib::fail;
use cadence_lib::testing::TestResult;

fn create_binary() -> u32 {
    sem::semaphore_create(SemaphoreKind::Binary, 1, Discipline::Priority).unwrap_or(u32::MAX)
}

pub fn test_counting_semaphore_counts() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);
    let a = spawn_ready("a", 10);
    let b = spawn_ready("b", 11);
    let c = spawn_ready("c", 12);
    settle(0);

    let sid = match sem::semaphore_create(SemaphoreKind::Counting, 2, Discipline::Fifo) {
        Ok(sid) => sid,
        Err(status) => return fail!("create failed: {:?}", status),
    };

    if sem::semaphore_obtain(sid, a, false, NO_TIMEOUT) != Status::Successful {
        return fail!("first obtain must succeed");
    }
    if sem::semaphore_obtain(sid, b, false, NO_TIMEOUT) != Status::Successful {
        return fail!("second obtain must succeed");
    }
    if sem::semaphore_obtain(sid, c, false, NO_TIMEOUT) != Status::Unsatisfied {
        return fail!("exhausted semaphore must turn a non-waiter away");
    }

    sem::semaphore_release(sid, a);
    if sem::semaphore_count(sid) != Ok(1) {
        return fail!("release with no waiters must restore the count");
    }
    TestResult::Pass
}

pub fn test_binary_obtain_tracks_ownership() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);
    let holder = spawn_ready("holder", 10);
    settle(0);

    let sid = create_binary();
    if sem::semaphore_obtain(sid, holder, false, NO_TIMEOUT) != Status::Successful {
        return fail!("obtain must succeed");
    }
    if sem::semaphore_holder(sid) != Some(holder) {
        return fail!("binary semaphore must record its owner");
    }
    if sem::semaphore_obtain(sid, holder, false, NO_TIMEOUT) != Status::Unsatisfied {
        return fail!("a held binary semaphore is unavailable");
    }
    TestResult::Pass
}

/// Release hands the semaphore straight to the longest-waiting thread —
/// ownership, wait status and scheduling all settle in the release, with
/// no wake-then-retry.
pub fn test_release_transfers_directly_to_waiter() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);
    let holder = spawn_ready("holder", 10);
    settle(0);

    let sid = create_binary();
    sem::semaphore_obtain(sid, holder, false, NO_TIMEOUT);

    let waiter = spawn_ready("waiter", 12);
    sem::semaphore_obtain(sid, waiter, true, NO_TIMEOUT);
    if thread::state_of(waiter) != ThreadState::Blocked {
        return fail!("contending thread must block");
    }

    sem::semaphore_release(sid, holder);

    if sem::semaphore_holder(sid) != Some(waiter) {
        return fail!("ownership must transfer inside the release");
    }
    if thread::wait_status(waiter) != Status::Successful {
        return fail!("resumed waiter must observe success");
    }
    if thread::state_of(waiter) != ThreadState::Ready && thread::state_of(waiter) != ThreadState::Running {
        return fail!("resumed waiter must be runnable");
    }
    TestResult::Pass
}

/// Scenario: single core, binary semaphore. Task A (priority 10) holds it;
/// Task B (priority 5) blocks on it. When A releases, B becomes the heir
/// directly — no intermediate re-dispatch of A or any other ready thread.
pub fn test_heir_handoff_on_release() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);

    let task_a = spawn_ready("task-a", 10);
    settle(0);

    let sid = create_binary();
    if sem::semaphore_obtain(sid, task_a, false, NO_TIMEOUT) != Status::Successful {
        return fail!("task A must obtain the semaphore");
    }

    let task_b = spawn_ready("task-b", 5);
    settle(0);
    if executing_on(0) != task_b {
        return fail!("task B (higher urgency) must preempt A first");
    }

    sem::semaphore_obtain(sid, task_b, true, NO_TIMEOUT);
    if thread::state_of(task_b) != ThreadState::Blocked {
        return fail!("task B must block on the held semaphore");
    }
    settle(0);
    if executing_on(0) != task_a {
        return fail!("task A must run again while B waits");
    }

    // A bystander that must not sneak in between the release and B.
    let _bystander = spawn_ready("bystander", 7);

    sem::semaphore_release(sid, task_a);

    if executing_on(0) != task_b {
        return fail!("task B must take over directly on release");
    }
    if sem::semaphore_holder(sid) != Some(task_b) {
        return fail!("task B must own the semaphore after the hand-off");
    }
    if thread::state_of(task_a) != ThreadState::Ready {
        return fail!("task A must be ready, not re-dispatched");
    }
    TestResult::Pass
}

/// Blocking on a held binary semaphore boosts the owner to the waiter's
/// urgency; releasing restores the owner's real priority.
pub fn test_priority_inheritance_boost_and_restore() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);

    let owner = spawn_ready("owner", 40);
    settle(0);
    let sid = create_binary();
    sem::semaphore_obtain(sid, owner, false, NO_TIMEOUT);

    let contender = spawn_ready("contender", 10);
    settle(0);
    sem::semaphore_obtain(sid, contender, true, NO_TIMEOUT);

    if thread::priority_of(owner) != Some(10) {
        return fail!("owner must inherit the contender's urgency");
    }
    if thread::real_priority_of(owner) != Some(40) {
        return fail!("inheritance must not touch the real priority");
    }

    sem::semaphore_release(sid, owner);

    if thread::priority_of(owner) != Some(40) {
        return fail!("release must restore the owner's real priority");
    }
    if sem::semaphore_holder(sid) != Some(contender) {
        return fail!("contender must own the semaphore");
    }
    TestResult::Pass
}

/// The boost propagates along the whole dependency chain: a waiter on S1
/// boosts S1's owner and, transitively, the thread that owner itself
/// waits on.
pub fn test_multilevel_inheritance_chain() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);

    let lower = spawn_ready("lower", 30);
    let middle = spawn_ready("middle", 20);
    settle(0);

    let s1 = create_binary();
    let s2 = create_binary();

    // `lower` holds S2; `middle` holds S1 and blocks on S2.
    sem::semaphore_obtain(s2, lower, false, NO_TIMEOUT);
    sem::semaphore_obtain(s1, middle, false, NO_TIMEOUT);
    sem::semaphore_obtain(s2, middle, true, NO_TIMEOUT);

    let urgent = spawn_ready("urgent", 5);
    settle(0);
    sem::semaphore_obtain(s1, urgent, true, NO_TIMEOUT);

    if thread::priority_of(middle) != Some(5) {
        return fail!("direct owner must inherit the waiter's urgency");
    }
    if thread::priority_of(lower) != Some(5) {
        return fail!("boost must propagate to the transitive blocker");
    }
    if resource::root_of(urgent) != Some(lower) {
        return fail!("waiter's root shortcut must resolve to the chain head");
    }
    TestResult::Pass
}

pub fn test_obtain_timeout_expires() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);
    let holder = spawn_ready("holder", 10);
    settle(0);

    let sid = create_binary();
    sem::semaphore_obtain(sid, holder, false, NO_TIMEOUT);

    let waiter = spawn_ready("waiter", 12);
    sem::semaphore_obtain(sid, waiter, true, 30);

    watchdog::watchdog_tick(30);

    if thread::wait_status(waiter) != Status::Timeout {
        return fail!("expired obtain must deliver the timeout status");
    }
    if thread::state_of(waiter) != ThreadState::Ready {
        return fail!("timed-out waiter must be runnable");
    }
    if sem::semaphore_holder(sid) != Some(holder) {
        return fail!("the holder keeps the semaphore across a waiter timeout");
    }
    TestResult::Pass
}

pub fn test_delete_resumes_waiters_with_deleted_status() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    install_idle(0);
    let holder = spawn_ready("holder", 10);
    settle(0);

    let sid = create_binary();
    sem::semaphore_obtain(sid, holder, false, NO_TIMEOUT);

    let waiter = spawn_ready("waiter", 12);
    sem::semaphore_obtain(sid, waiter, true, NO_TIMEOUT);

    if sem::semaphore_delete(sid) != Status::Successful {
        return fail!("delete must succeed");
    }
    if thread::wait_status(waiter) != Status::ObjectWasDeleted {
        return fail!("waiter must observe object-deleted");
    }
    if thread::state_of(waiter) != ThreadState::Ready {
        return fail!("waiter must be resumed");
    }
    TestResult::Pass
}

cadence_lib::define_test_suite!(
    sem,
    [
        test_counting_semaphore_counts,
        test_binary_obtain_tracks_ownership,
        test_release_transfers_directly_to_waiter,
        test_heir_handoff_on_release,
        test_priority_inheritance_boost_and_restore,
        test_multilevel_inheritance_chain,
        test_obtain_timeout_expires,
        test_delete_resumes_waiters_with_deleted_status,
    ]
);
