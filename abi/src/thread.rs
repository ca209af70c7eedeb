//! Thread ABI types shared between kernel subsystems.
//!
//! This module is the single source of truth for thread-related types and
//! constants. All subsystems (scheduler, dispatch, wait queues, resource
//! tracker) import from here rather than defining their own copies.

// --- Thread Configuration ---

pub const MAX_THREADS: usize = 64;
pub const THREAD_NAME_MAX_LEN: usize = 32;
pub const INVALID_THREAD_ID: u32 = 0xFFFF_FFFF;

pub type ThreadId = u32;

// --- Priority ---

/// Number of distinct priority levels. Lower numeric value means higher
/// urgency; `PRIORITY_IDLE` is reserved for per-processor idle threads.
pub const PRIORITY_COUNT: usize = 64;

pub type Priority = u8;

pub const PRIORITY_HIGHEST: Priority = 0;
pub const PRIORITY_DEFAULT: Priority = 32;
pub const PRIORITY_IDLE: Priority = (PRIORITY_COUNT - 1) as Priority;

// --- Timeouts ---

/// Timeout value meaning "wait forever" — no watchdog is armed.
pub const NO_TIMEOUT: u64 = 0;

// --- ThreadState ---

/// Type-safe thread state with explicit state-machine semantics.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Thread slot is not in use.
    #[default]
    Invalid = 0,
    /// Thread is runnable, held in a scheduler ready structure.
    Ready = 1,
    /// Thread is executing (or is the chosen heir) on a processor.
    Running = 2,
    /// Thread is suspended on a wait queue.
    Blocked = 3,
    /// Thread has terminated and is awaiting slot reclamation.
    Terminated = 4,
}

impl ThreadState {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Blocked,
            4 => Self::Terminated,
            _ => Self::Invalid,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn is_runnable(self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    #[inline]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Invalid => matches!(target, Self::Ready),
            Self::Ready => matches!(target, Self::Running | Self::Blocked | Self::Terminated),
            Self::Running => matches!(target, Self::Ready | Self::Blocked | Self::Terminated),
            Self::Blocked => matches!(target, Self::Ready | Self::Terminated),
            Self::Terminated => matches!(target, Self::Invalid | Self::Terminated),
        }
    }
}

// --- BlockReason ---

/// Reason why a thread is in the Blocked state.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlockReason {
    #[default]
    None = 0,
    /// Waiting to receive a message.
    MessageSeize = 1,
    /// Waiting for a free message slot to send into.
    MessageSurrender = 2,
    /// Waiting on a semaphore.
    Semaphore = 3,
    /// Waiting on some other blocking object.
    Generic = 4,
}

impl BlockReason {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::MessageSeize,
            2 => Self::MessageSurrender,
            3 => Self::Semaphore,
            4 => Self::Generic,
            _ => Self::None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

bitflags::bitflags! {
    /// Mask form of [`ThreadState`] used where several states must be
    /// tested at once (e.g. "is the thread in any blocked-like state").
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ThreadStateMask: u8 {
        const READY = 1 << ThreadState::Ready as u8;
        const RUNNING = 1 << ThreadState::Running as u8;
        const BLOCKED = 1 << ThreadState::Blocked as u8;
        const TERMINATED = 1 << ThreadState::Terminated as u8;
        const RUNNABLE = Self::READY.bits() | Self::RUNNING.bits();
    }
}

impl ThreadStateMask {
    #[inline]
    pub const fn matches(self, state: ThreadState) -> bool {
        self.bits() & (1 << state.as_u8()) != 0
    }
}
