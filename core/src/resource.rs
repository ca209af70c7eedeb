//! Resource ownership tracker.
//!
//! An ownership forest: each thread carries one resource node recording what
//! it waits for (`dependency`), the thread it transitively waits on
//! (`root`), and the LIFO list of resources it owns. Each resource records
//! its owner and the ordered rivals still contending for it. Priority
//! inheritance protocols are built on top: the chain walk answers "who must
//! be boosted", the root shortcut answers "what does thread T ultimately
//! wait for" in a single hop.
//!
//! The `root` shortcuts look cyclic but are not — they are forest parent
//! pointers, recomputed by explicit re-validation whenever ownership moves.
//!
//! Release discipline is strict LIFO: only the most recently obtained
//! resource may be released, and only by its owner. Violations are
//! programming errors — asserted in debug builds, escalated to the
//! unrecoverable-error path otherwise, never silently tolerated.

use cadence_abi::thread::{INVALID_THREAD_ID, MAX_THREADS, Priority, ThreadId};
use cadence_abi::{FatalCode, Status};
use cadence_lib::{IrqMutex, kernel_fatal};

use crate::thread;

pub const MAX_RESOURCES: usize = 32;

pub const INVALID_RESOURCE_ID: u32 = u32::MAX;

/// What the `iterate` visitor wants done with the node it just saw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterateDecision {
    Continue,
    /// Drop the visited node's dependency edge, then keep walking.
    Detach,
    Stop,
}

#[derive(Clone, Copy)]
struct ResourceNode {
    /// Resource this thread is contending for, or `INVALID_RESOURCE_ID`.
    dependency: u32,
    /// Ultimate blocker of this thread; `INVALID_THREAD_ID` means "none".
    root: u32,
    /// Most recently obtained resource (LIFO head of the owned list).
    owned_head: u32,
    /// Next thread in the rival chain of `dependency`'s resource.
    rival_link: u32,
}

impl ResourceNode {
    const fn empty() -> Self {
        Self {
            dependency: INVALID_RESOURCE_ID,
            root: INVALID_THREAD_ID,
            owned_head: INVALID_RESOURCE_ID,
            rival_link: INVALID_THREAD_ID,
        }
    }
}

#[derive(Clone, Copy)]
struct ResourceControl {
    in_use: bool,
    owner: ThreadId,
    /// First rival (arrival order); the chain runs through the nodes.
    rivals_head: u32,
    /// Link in the owner's owned LIFO list.
    next_owned: u32,
}

impl ResourceControl {
    const fn empty() -> Self {
        Self {
            in_use: false,
            owner: INVALID_THREAD_ID,
            rivals_head: INVALID_THREAD_ID,
            next_owned: INVALID_RESOURCE_ID,
        }
    }
}

struct ResourceTable {
    resources: [ResourceControl; MAX_RESOURCES],
    nodes: [ResourceNode; MAX_THREADS],
}

impl ResourceTable {
    const fn new() -> Self {
        Self {
            resources: [ResourceControl::empty(); MAX_RESOURCES],
            nodes: [ResourceNode::empty(); MAX_THREADS],
        }
    }

    fn append_rival(&mut self, rid: u32, tid: ThreadId) {
        self.nodes[tid as usize].rival_link = INVALID_THREAD_ID;
        let head = self.resources[rid as usize].rivals_head;
        if head == INVALID_THREAD_ID {
            self.resources[rid as usize].rivals_head = tid;
            return;
        }
        let mut cursor = head;
        while self.nodes[cursor as usize].rival_link != INVALID_THREAD_ID {
            cursor = self.nodes[cursor as usize].rival_link;
        }
        self.nodes[cursor as usize].rival_link = tid;
    }

    fn remove_rival(&mut self, rid: u32, tid: ThreadId) -> bool {
        let mut prev = INVALID_THREAD_ID;
        let mut cursor = self.resources[rid as usize].rivals_head;
        while cursor != INVALID_THREAD_ID {
            if cursor == tid {
                let next = self.nodes[tid as usize].rival_link;
                if prev == INVALID_THREAD_ID {
                    self.resources[rid as usize].rivals_head = next;
                } else {
                    self.nodes[prev as usize].rival_link = next;
                }
                self.nodes[tid as usize].rival_link = INVALID_THREAD_ID;
                return true;
            }
            prev = cursor;
            cursor = self.nodes[cursor as usize].rival_link;
        }
        false
    }

    /// Re-derive every root shortcut from the dependency edges. Runs after
    /// any edge mutation; a walk longer than the thread count means the
    /// forest has degenerated into a cycle.
    fn recompute_roots(&mut self) {
        for index in 0..MAX_THREADS {
            let mut cursor = index as ThreadId;
            let mut steps = 0;
            loop {
                let dep = self.nodes[cursor as usize].dependency;
                if dep == INVALID_RESOURCE_ID {
                    break;
                }
                let owner = self.resources[dep as usize].owner;
                if owner == INVALID_THREAD_ID {
                    break;
                }
                cursor = owner;
                steps += 1;
                if steps > MAX_THREADS {
                    debug_assert!(false, "resource dependency cycle");
                    kernel_fatal(FatalCode::OwnershipCycle);
                }
            }
            self.nodes[index].root = if cursor == index as ThreadId {
                INVALID_THREAD_ID
            } else {
                cursor
            };
        }
    }
}

static RESOURCES: IrqMutex<ResourceTable> = IrqMutex::new(ResourceTable::new());

pub fn resource_initialize() {
    let mut table = RESOURCES.lock();
    *table = ResourceTable::new();
}

pub fn resource_create() -> Result<u32, Status> {
    let mut table = RESOURCES.lock();
    let Some(index) = table.resources.iter().position(|r| !r.in_use) else {
        return Err(Status::TooMany);
    };
    table.resources[index] = ResourceControl {
        in_use: true,
        ..ResourceControl::empty()
    };
    Ok(index as u32)
}

/// Destroy an unowned resource. A still-owned resource is refused.
pub fn resource_destroy(rid: u32) -> Status {
    let mut table = RESOURCES.lock();
    if (rid as usize) >= MAX_RESOURCES || !table.resources[rid as usize].in_use {
        return Status::InvalidId;
    }
    if table.resources[rid as usize].owner != INVALID_THREAD_ID {
        return Status::Unsatisfied;
    }
    table.resources[rid as usize] = ResourceControl::empty();
    Status::Successful
}

/// Try to take ownership of `rid` for `tid`.
///
/// `Successful` makes the thread the owner and pushes the resource onto its
/// LIFO owned list. `Unsatisfied` records the thread as a rival with a
/// dependency edge — the caller is expected to block and, for inheritance
/// protocols, boost along the chain.
pub fn obtain(rid: u32, tid: ThreadId) -> Status {
    let mut table = RESOURCES.lock();
    if (rid as usize) >= MAX_RESOURCES || !table.resources[rid as usize].in_use {
        return Status::InvalidId;
    }
    if (tid as usize) >= MAX_THREADS {
        return Status::InvalidId;
    }

    let owner = table.resources[rid as usize].owner;
    if owner == INVALID_THREAD_ID {
        table.resources[rid as usize].owner = tid;
        table.resources[rid as usize].next_owned = table.nodes[tid as usize].owned_head;
        table.nodes[tid as usize].owned_head = rid;
        return Status::Successful;
    }

    if owner == tid {
        // Obtaining an already-owned resource would create a self-cycle.
        return Status::Unsatisfied;
    }

    table.append_rival(rid, tid);
    table.nodes[tid as usize].dependency = rid;
    table.recompute_roots();
    Status::Unsatisfied
}

/// Release `rid`, transferring ownership to `successor` (or the first
/// rival, or nobody).
///
/// Only the LIFO head of the releasing thread's owned list may be released,
/// and only by its owner — anything else escalates. Returns the new owner,
/// whose dependency edge has been cleared and whose root shortcuts (and
/// those of every remaining rival) have been re-pointed.
pub fn release(rid: u32, tid: ThreadId, successor: Option<ThreadId>) -> Result<Option<ThreadId>, Status> {
    let mut table = RESOURCES.lock();
    if (rid as usize) >= MAX_RESOURCES || !table.resources[rid as usize].in_use {
        return Err(Status::InvalidId);
    }

    if table.resources[rid as usize].owner != tid {
        debug_assert!(false, "resource released by non-owner");
        kernel_fatal(FatalCode::ResourceReleaseNotOwner);
    }
    if table.nodes[tid as usize].owned_head != rid {
        debug_assert!(false, "resource released out of LIFO order");
        kernel_fatal(FatalCode::ResourceReleaseNotLifoHead);
    }

    // Pop the releasing thread's LIFO head.
    table.nodes[tid as usize].owned_head = table.resources[rid as usize].next_owned;
    table.resources[rid as usize].next_owned = INVALID_RESOURCE_ID;

    let next_owner = successor.or_else(|| {
        let head = table.resources[rid as usize].rivals_head;
        (head != INVALID_THREAD_ID).then_some(head)
    });

    let Some(winner) = next_owner else {
        table.resources[rid as usize].owner = INVALID_THREAD_ID;
        table.recompute_roots();
        return Ok(None);
    };

    if (winner as usize) >= MAX_THREADS {
        return Err(Status::InvalidId);
    }
    if !table.remove_rival(rid, winner) {
        debug_assert!(false, "successor is not a rival of the resource");
        return Err(Status::InvalidId);
    }

    table.nodes[winner as usize].dependency = INVALID_RESOURCE_ID;
    table.resources[rid as usize].owner = winner;
    table.resources[rid as usize].next_owned = table.nodes[winner as usize].owned_head;
    table.nodes[winner as usize].owned_head = rid;
    table.recompute_roots();
    Ok(Some(winner))
}

/// Withdraw a rival that stopped waiting (timeout, object deletion): the
/// thread's dependency edge and rival registration are dropped. Harmless
/// when the thread is not a rival of `rid`.
pub fn abandon(rid: u32, tid: ThreadId) {
    let mut table = RESOURCES.lock();
    if (rid as usize) >= MAX_RESOURCES || (tid as usize) >= MAX_THREADS {
        return;
    }
    if table.nodes[tid as usize].dependency != rid {
        return;
    }
    table.remove_rival(rid, tid);
    table.nodes[tid as usize].dependency = INVALID_RESOURCE_ID;
    table.recompute_roots();
}

/// Walk the dependency chain starting just above `top`: the first node
/// visited is `top`'s owner, then that thread's blocker's owner, and so on.
///
/// The visitor may detach the node it is visiting (dropping its dependency
/// edge) and the walk still continues upward. The visitor runs under the
/// tracker's lock and must not call back into this module.
pub fn iterate(top: u32, visitor: &mut dyn FnMut(ThreadId) -> IterateDecision) -> Status {
    let mut table = RESOURCES.lock();
    if (top as usize) >= MAX_RESOURCES || !table.resources[top as usize].in_use {
        return Status::InvalidId;
    }

    let mut cursor = table.resources[top as usize].owner;
    let mut detached = false;
    let mut steps = 0;
    while cursor != INVALID_THREAD_ID {
        let dependency = table.nodes[cursor as usize].dependency;
        let next = if dependency == INVALID_RESOURCE_ID {
            INVALID_THREAD_ID
        } else {
            table.resources[dependency as usize].owner
        };

        match visitor(cursor) {
            IterateDecision::Stop => break,
            IterateDecision::Detach => {
                if dependency != INVALID_RESOURCE_ID {
                    table.remove_rival(dependency, cursor);
                    table.nodes[cursor as usize].dependency = INVALID_RESOURCE_ID;
                    detached = true;
                }
            }
            IterateDecision::Continue => {}
        }

        cursor = next;
        steps += 1;
        if steps > MAX_THREADS {
            debug_assert!(false, "resource dependency cycle");
            kernel_fatal(FatalCode::OwnershipCycle);
        }
    }

    if detached {
        table.recompute_roots();
    }
    Status::Successful
}

/// Highest-urgency priority among every rival of every resource `tid`
/// still owns. `None` when nothing contends.
pub fn highest_rival_priority(tid: ThreadId) -> Option<Priority> {
    let table = RESOURCES.lock();
    if (tid as usize) >= MAX_THREADS {
        return None;
    }
    let mut best: Option<Priority> = None;
    let mut rid = table.nodes[tid as usize].owned_head;
    while rid != INVALID_RESOURCE_ID {
        let mut rival = table.resources[rid as usize].rivals_head;
        while rival != INVALID_THREAD_ID {
            if let Some(priority) = thread::priority_of(rival) {
                best = Some(match best {
                    Some(current) => current.min(priority),
                    None => priority,
                });
            }
            rival = table.nodes[rival as usize].rival_link;
        }
        rid = table.resources[rid as usize].next_owned;
    }
    best
}

// --- Queries ---------------------------------------------------------------

pub fn owner_of(rid: u32) -> Option<ThreadId> {
    let table = RESOURCES.lock();
    if (rid as usize) >= MAX_RESOURCES || !table.resources[rid as usize].in_use {
        return None;
    }
    let owner = table.resources[rid as usize].owner;
    (owner != INVALID_THREAD_ID).then_some(owner)
}

pub fn rival_count(rid: u32) -> u32 {
    let table = RESOURCES.lock();
    if (rid as usize) >= MAX_RESOURCES || !table.resources[rid as usize].in_use {
        return 0;
    }
    let mut count = 0;
    let mut cursor = table.resources[rid as usize].rivals_head;
    while cursor != INVALID_THREAD_ID {
        count += 1;
        cursor = table.nodes[cursor as usize].rival_link;
    }
    count
}

/// Resource the thread is contending for, if any.
pub fn dependency_of(tid: ThreadId) -> Option<u32> {
    let table = RESOURCES.lock();
    if (tid as usize) >= MAX_THREADS {
        return None;
    }
    let dep = table.nodes[tid as usize].dependency;
    (dep != INVALID_RESOURCE_ID).then_some(dep)
}

/// Thread `tid` ultimately waits on — one hop through the root shortcut.
pub fn root_of(tid: ThreadId) -> Option<ThreadId> {
    let table = RESOURCES.lock();
    if (tid as usize) >= MAX_THREADS {
        return None;
    }
    let root = table.nodes[tid as usize].root;
    (root != INVALID_THREAD_ID).then_some(root)
}

/// LIFO head of the thread's owned list, if it owns anything.
pub fn owned_head(tid: ThreadId) -> Option<u32> {
    let table = RESOURCES.lock();
    if (tid as usize) >= MAX_THREADS {
        return None;
    }
    let head = table.nodes[tid as usize].owned_head;
    (head != INVALID_RESOURCE_ID).then_some(head)
}

pub fn owns_any(tid: ThreadId) -> bool {
    owned_head(tid).is_some()
}
