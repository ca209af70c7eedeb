//! Dispatch controller tests: nesting arithmetic, Giant Lock coupling and
//! deferred heir hand-off.

use cadence_abi::thread::ThreadState;
use cadence_lib::testing::TestResult;
use cadence_lib::{fail, giant_is_owner, giant_nest_level};

use crate::dispatch::{
    DispatchGuard, dispatch_disable, dispatch_disable_level, dispatch_drop_level, dispatch_enable,
};
use crate::test_support::{CoreFixture, executing_on, heir_on, install_idle, spawn};
use crate::{scheduler, thread};

/// The level after any prefix of disables/enables equals the number of
/// unmatched disables in that prefix.
pub fn test_disable_level_matches_unmatched_increments() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();

    let steps: [(bool, u32); 8] = [
        (true, 1),
        (true, 2),
        (true, 3),
        (false, 2),
        (true, 3),
        (false, 2),
        (false, 1),
        (false, 0),
    ];

    for (index, (disable, expected)) in steps.iter().enumerate() {
        let level = if *disable {
            dispatch_disable()
        } else {
            dispatch_enable()
        };
        if level != *expected {
            return fail!("step {}: expected level {}, got {}", index, expected, level);
        }
        if dispatch_disable_level() != *expected {
            return fail!("step {}: stored level disagrees", index);
        }
    }
    TestResult::Pass
}

/// The Giant Lock is taken on 0 -> 1 and dropped on 1 -> 0; inner nesting
/// levels leave it untouched.
pub fn test_giant_lock_tracks_outermost_transition() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();

    if giant_is_owner(0) {
        return fail!("giant owned before any disable");
    }

    dispatch_disable();
    if !giant_is_owner(0) || giant_nest_level() != 1 {
        return fail!("outermost disable must acquire the giant lock");
    }

    dispatch_disable();
    if giant_nest_level() != 1 {
        return fail!("nested disable must not re-acquire the giant lock");
    }

    dispatch_enable();
    if !giant_is_owner(0) {
        return fail!("inner enable must keep the giant lock");
    }

    dispatch_enable();
    if giant_is_owner(0) || giant_nest_level() != 0 {
        return fail!("outermost enable must release the giant lock");
    }
    TestResult::Pass
}

/// A switch flagged inside a dispatch-disabled region happens only when
/// the level drains back to zero.
pub fn test_dispatch_deferred_while_disabled() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let idle = install_idle(0);
    let worker = spawn("worker", 20);

    dispatch_disable();
    scheduler::enqueue_priority_fifo(worker);

    if heir_on(0) != worker {
        dispatch_enable();
        return fail!("worker must become heir immediately");
    }
    if executing_on(0) != idle {
        dispatch_enable();
        return fail!("switch must be deferred while dispatching is disabled");
    }

    dispatch_enable();

    if executing_on(0) != worker {
        return fail!("draining the level must perform the pending switch");
    }
    if thread::state_of(worker) != ThreadState::Running {
        return fail!("dispatched heir must be running");
    }
    TestResult::Pass
}

pub fn test_dispatch_guard_nesting() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();

    {
        let _outer = DispatchGuard::new();
        if dispatch_disable_level() != 1 {
            return fail!("outer guard must raise the level to 1");
        }
        {
            let _inner = DispatchGuard::new();
            if dispatch_disable_level() != 2 {
                return fail!("inner guard must nest");
            }
        }
        if dispatch_disable_level() != 1 {
            return fail!("inner guard drop must un-nest");
        }
    }
    if dispatch_disable_level() != 0 {
        return fail!("all guards dropped, level must be 0");
    }
    TestResult::Pass
}

/// The fatal-unwind reset clears the nesting and the Giant Lock without
/// requiring matched enables.
pub fn test_drop_level_resets_unconditionally() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();

    dispatch_disable();
    dispatch_disable();
    dispatch_drop_level();

    if dispatch_disable_level() != 0 {
        return fail!("drop must reset the level to 0");
    }
    if giant_is_owner(0) {
        return fail!("drop must release the giant lock");
    }
    TestResult::Pass
}

cadence_lib::define_test_suite!(
    dispatch,
    [
        test_disable_level_matches_unmatched_increments,
        test_giant_lock_tracks_outermost_transition,
        test_dispatch_deferred_while_disabled,
        test_dispatch_guard_nesting,
        test_drop_level_resets_unconditionally,
    ]
);
