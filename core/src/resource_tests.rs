//! Resource tracker tests: LIFO ownership discipline, rival bookkeeping,
//! root shortcuts and the ancestor walk.

use cadence_lib::fail;
use cadence_lib::testing::TestResult;

use crate::resource::{self, IterateDecision};
use crate::test_support::{CoreFixture, spawn};

pub fn test_uncontested_obtain_takes_ownership() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let owner = spawn("owner", 10);
    let r = match resource::resource_create() {
        Ok(r) => r,
        Err(status) => return fail!("resource create failed: {:?}", status),
    };

    if !resource::obtain(r, owner).is_successful() {
        return fail!("uncontested obtain must succeed");
    }
    if resource::owner_of(r) != Some(owner) {
        return fail!("owner must be recorded");
    }
    if resource::rival_count(r) != 0 {
        return fail!("an owned, uncontested resource has no rivals");
    }
    if resource::root_of(owner).is_some() {
        return fail!("an unblocked owner has no root");
    }
    TestResult::Pass
}

/// Acquisition history is strict LIFO: after obtaining R1 then R2, R2 is
/// the only releasable head — releasing R1 first is the programming error
/// the debug assertion guards against.
pub fn test_lifo_release_discipline() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let owner = spawn("owner", 10);
    let r1 = resource::resource_create().unwrap_or(u32::MAX);
    let r2 = resource::resource_create().unwrap_or(u32::MAX);

    resource::obtain(r1, owner);
    resource::obtain(r2, owner);

    if resource::owned_head(owner) != Some(r2) {
        return fail!("most recently obtained resource must be the LIFO head");
    }

    // In-order release walks the head back down.
    match resource::release(r2, owner, None) {
        Ok(None) => {}
        _ => return fail!("releasing the LIFO head must succeed"),
    }
    if resource::owned_head(owner) != Some(r1) {
        return fail!("head must fall back to the previously obtained resource");
    }
    match resource::release(r1, owner, None) {
        Ok(None) => {}
        _ => return fail!("releasing the new head must succeed"),
    }
    if resource::owns_any(owner) {
        return fail!("owner must end up owning nothing");
    }
    TestResult::Pass
}

pub fn test_contested_obtain_records_rival_and_root() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let owner = spawn("owner", 10);
    let rival = spawn("rival", 5);
    let r = resource::resource_create().unwrap_or(u32::MAX);

    resource::obtain(r, owner);
    if resource::obtain(r, rival) != cadence_abi::Status::Unsatisfied {
        return fail!("contested obtain must be unsatisfied");
    }
    if resource::rival_count(r) != 1 {
        return fail!("rival must be registered");
    }
    if resource::dependency_of(rival) != Some(r) {
        return fail!("rival's dependency edge must point at the resource");
    }
    if resource::root_of(rival) != Some(owner) {
        return fail!("rival's root must resolve to the owner");
    }
    TestResult::Pass
}

/// Ownership transfer re-points the root shortcut of every remaining
/// rival at the new owner.
pub fn test_transfer_repoints_remaining_rivals() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let a = spawn("a", 10);
    let b = spawn("b", 11);
    let c = spawn("c", 12);
    let r = resource::resource_create().unwrap_or(u32::MAX);

    resource::obtain(r, a);
    resource::obtain(r, b);
    resource::obtain(r, c);

    match resource::release(r, a, None) {
        Ok(Some(winner)) if winner == b => {}
        _ => return fail!("release must transfer to the first rival"),
    }

    if resource::owner_of(r) != Some(b) {
        return fail!("new owner must be recorded");
    }
    if resource::dependency_of(b).is_some() {
        return fail!("new owner must no longer depend on the resource");
    }
    if resource::owned_head(b) != Some(r) {
        return fail!("transferred resource must head the new owner's LIFO list");
    }
    if resource::root_of(c) != Some(b) {
        return fail!("remaining rival's root must re-point to the new owner");
    }
    if resource::rival_count(r) != 1 {
        return fail!("only the remaining rival may stay registered");
    }
    TestResult::Pass
}

/// An un-owned resource has an empty rival list by definition.
pub fn test_released_resource_has_no_rivals() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let a = spawn("a", 10);
    let b = spawn("b", 11);
    let r = resource::resource_create().unwrap_or(u32::MAX);

    resource::obtain(r, a);
    resource::obtain(r, b);
    resource::abandon(r, b);

    match resource::release(r, a, None) {
        Ok(None) => {}
        _ => return fail!("release with no rivals must leave the resource unowned"),
    }
    if resource::owner_of(r).is_some() || resource::rival_count(r) != 0 {
        return fail!("an un-owned resource must have an empty rival list");
    }
    TestResult::Pass
}

/// The walk starts just above `top`: owner first, then each ancestor up
/// the dependency chain.
pub fn test_iterate_visits_ancestors_in_order() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let a = spawn("a", 10);
    let b = spawn("b", 11);
    let c = spawn("c", 12);
    let r1 = resource::resource_create().unwrap_or(u32::MAX);
    let r2 = resource::resource_create().unwrap_or(u32::MAX);

    // A owns R1; B owns R2 but contends for R1; C contends for R2.
    resource::obtain(r1, a);
    resource::obtain(r2, b);
    resource::obtain(r1, b);
    resource::obtain(r2, c);

    let mut visited = [u32::MAX; 4];
    let mut visit_count = 0usize;
    resource::iterate(r2, &mut |node| {
        if visit_count < visited.len() {
            visited[visit_count] = node;
            visit_count += 1;
        }
        IterateDecision::Continue
    });

    if visit_count != 2 || visited[0] != b || visited[1] != a {
        return fail!("walk above r2 must visit its owner, then the owner's blocker");
    }
    if resource::root_of(c) != Some(a) {
        return fail!("transitive rival must resolve its root to the chain head");
    }
    TestResult::Pass
}

/// A visitor may detach the node it is visiting and the walk continues.
pub fn test_iterate_detach_drops_dependency_edge() -> TestResult {
    let _fixture = CoreFixture::uniprocessor();
    let a = spawn("a", 10);
    let b = spawn("b", 11);
    let c = spawn("c", 12);
    let r1 = resource::resource_create().unwrap_or(u32::MAX);
    let r2 = resource::resource_create().unwrap_or(u32::MAX);

    resource::obtain(r1, a);
    resource::obtain(r2, b);
    resource::obtain(r1, b);
    resource::obtain(r2, c);

    let mut visit_count = 0usize;
    resource::iterate(r2, &mut |node| {
        visit_count += 1;
        if node == b {
            IterateDecision::Detach
        } else {
            IterateDecision::Continue
        }
    });

    if visit_count != 2 {
        return fail!("detach must not stop the walk");
    }
    if resource::dependency_of(b).is_some() {
        return fail!("detached node must lose its dependency edge");
    }
    if resource::rival_count(r1) != 0 {
        return fail!("detached node must leave the rival list");
    }
    if resource::root_of(c) != Some(b) {
        return fail!("roots must be recomputed after the detach");
    }
    TestResult::Pass
}

cadence_lib::define_test_suite!(
    resource,
    [
        test_uncontested_obtain_takes_ownership,
        test_lifo_release_discipline,
        test_contested_obtain_records_rival_and_root,
        test_transfer_repoints_remaining_rivals,
        test_released_resource_has_no_rivals,
        test_iterate_visits_ancestors_in_order,
        test_iterate_detach_drops_dependency_edge,
    ]
);
