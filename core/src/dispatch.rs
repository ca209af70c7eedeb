//! Dispatch controller.
//!
//! Every kernel mutation happens inside a dispatch-disabled region: the
//! per-CPU nesting counter defers context switches while invariants are in
//! flux, and the outermost transition acquires/releases the Giant Lock so
//! the region is atomic system-wide. The actual switch runs after the Giant
//! Lock is dropped — the heir hand-off itself never executes under the lock.

use cadence_abi::thread::INVALID_THREAD_ID;
use cadence_abi::FatalCode;
use cadence_lib::kernel_services::platform;
use cadence_lib::{giant_acquire, giant_drop, giant_release, kernel_fatal, percpu};

use crate::thread;

/// Disable dispatching on the current processor, nesting. The 0 -> 1
/// transition acquires the Giant Lock for this processor. Callable from any
/// context, including interrupt handlers.
///
/// Returns the new nesting level.
pub fn dispatch_disable() -> u32 {
    let isr = platform::interrupt_disable();
    let cpu = percpu::current_processor_index();
    let control = percpu::per_cpu(cpu);

    let level = control.dispatch_disable_level();
    if level == 0 {
        giant_acquire(cpu);
    }
    let new_level = level + 1;
    control.set_dispatch_disable_level(new_level);

    platform::interrupt_restore(isr);
    new_level
}

/// Re-enable dispatching, un-nesting. The 1 -> 0 transition releases the
/// Giant Lock and, if a switch became pending inside the region, performs
/// it now.
///
/// Returns the new nesting level.
pub fn dispatch_enable() -> u32 {
    let isr = platform::interrupt_disable();
    let cpu = percpu::current_processor_index();
    let control = percpu::per_cpu(cpu);

    let level = control.dispatch_disable_level();
    debug_assert!(level > 0, "dispatch_enable without matching dispatch_disable");
    if level == 0 {
        kernel_fatal(FatalCode::DispatchLevelUnderflow);
    }

    let new_level = level - 1;
    control.set_dispatch_disable_level(new_level);

    if new_level == 0 {
        giant_release(cpu);
        if control.dispatch_needed() {
            platform::interrupt_restore(isr);
            thread_dispatch(cpu);
            return 0;
        }
    }

    platform::interrupt_restore(isr);
    new_level
}

/// Unconditionally reset the nesting level to zero and drop every Giant
/// Lock nesting held by this processor.
///
/// Fatal/exception unwind path only; the caller must already have
/// interrupts disabled. Deliberately skips the acquire/release symmetry.
pub fn dispatch_drop_level() {
    let cpu = percpu::current_processor_index();
    percpu::per_cpu(cpu).set_dispatch_disable_level(0);
    giant_drop(cpu);
}

/// Current nesting level of the executing processor.
#[inline]
pub fn dispatch_disable_level() -> u32 {
    percpu::current_per_cpu().dispatch_disable_level()
}

/// Perform pending heir hand-offs for `cpu`. Loops because the switched-to
/// thread may immediately make another switch pending.
fn thread_dispatch(cpu: usize) {
    loop {
        let isr = platform::interrupt_disable();
        let control = percpu::per_cpu(cpu);

        if !control.dispatch_needed() {
            platform::interrupt_restore(isr);
            return;
        }
        control.set_dispatch_needed(false);

        let executing = control.executing();
        let heir = control.heir();
        if heir == INVALID_THREAD_ID || heir == executing {
            platform::interrupt_restore(isr);
            continue;
        }

        control.set_executing(heir);
        thread::note_context_switch(executing, heir);
        platform::interrupt_restore(isr);

        // The register-level switch happens outside the Giant Lock.
        platform::context_switch(executing, heir);
    }
}

/// RAII dispatch-disabled region.
///
/// Blocking operations hold one of these across their whole critical
/// section; the deferred switch (if any) runs when the guard drops.
#[must_use = "if unused, dispatching is immediately re-enabled"]
pub struct DispatchGuard {
    _not_send: core::marker::PhantomData<*mut ()>,
}

impl DispatchGuard {
    #[inline]
    pub fn new() -> Self {
        dispatch_disable();
        Self {
            _not_send: core::marker::PhantomData,
        }
    }
}

impl Default for DispatchGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DispatchGuard {
    #[inline]
    fn drop(&mut self) {
        dispatch_enable();
    }
}
