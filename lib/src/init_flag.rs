//! One-shot and resettable boolean latches.

use core::sync::atomic::{AtomicBool, Ordering};

/// One-shot initialization latch.
///
/// `init_once()` returns `true` exactly once; later callers see `false` and
/// must skip their initialization body.
pub struct InitFlag {
    initialized: AtomicBool,
}

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
        }
    }

    /// Claim initialization. Returns `true` for the first caller only.
    #[inline]
    pub fn init_once(&self) -> bool {
        !self.initialized.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Resettable boolean flag with release/acquire semantics.
pub struct StateFlag {
    active: AtomicBool,
}

impl StateFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn set_active(&self) {
        self.active.store(true, Ordering::Release);
    }

    #[inline]
    pub fn set_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Default for StateFlag {
    fn default() -> Self {
        Self::new()
    }
}
