//! Pointer cell holding a registered service table.
//!
//! A `ServiceCell` starts out pointing at a built-in fallback table and is
//! swapped to the platform's table during early boot. Reads are lock-free;
//! the latest registration wins.

use core::sync::atomic::{AtomicPtr, Ordering};

pub struct ServiceCell<T: 'static> {
    current: AtomicPtr<T>,
}

impl<T: 'static> ServiceCell<T> {
    #[inline]
    pub const fn new(fallback: &'static T) -> Self {
        Self {
            current: AtomicPtr::new(fallback as *const T as *mut T),
        }
    }

    #[inline]
    pub fn set(&self, services: &'static T) {
        self.current
            .store(services as *const T as *mut T, Ordering::Release);
    }

    #[inline]
    pub fn get(&self) -> &'static T {
        // SAFETY: the pointer always originates from a `&'static T` — either
        // the fallback passed to `new` or a table passed to `set`.
        unsafe { &*self.current.load(Ordering::Acquire) }
    }
}
