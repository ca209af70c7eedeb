use cadence_abi::ThreadId;

crate::define_service! {
    /// Platform hardware abstraction layer.
    ///
    /// Registered once during early boot by the architecture layer, which has
    /// visibility into the interrupt controller, the context-switch assembly
    /// and the timebase. The fallback table is fully portable: it masks
    /// nothing, reports a single processor and treats context switches as
    /// completed bookkeeping, which is exactly what the hosted test harness
    /// needs.
    platform: PORTABLE_PLATFORM => PlatformServices {
        // -- Interrupt masking ---------------------------------------------
        interrupt_disable() -> usize;
        interrupt_restore(level: usize);

        // -- Processor topology --------------------------------------------
        current_processor() -> usize;
        processor_count() -> usize;

        // -- Context switch / cross-CPU kicks ------------------------------
        context_switch(executing: ThreadId, heir: ThreadId);
        reschedule_ipi(cpu: usize);

        // -- Timebase ------------------------------------------------------
        timer_ticks() -> u64;

        // -- Console -------------------------------------------------------
        @no_wrapper console_puts(s: &[u8]);

        // -- Lifecycle -----------------------------------------------------
        @no_wrapper fatal(code: u32) -> !;
    }
}

static PORTABLE_PLATFORM: PlatformServices = PlatformServices {
    interrupt_disable: || 0,
    interrupt_restore: |_level| {},
    current_processor: || 0,
    processor_count: || 1,
    context_switch: |_executing, _heir| {},
    reschedule_ipi: |_cpu| {},
    timer_ticks: || 0,
    console_puts: |_s| {},
    fatal: |code| panic!("kernel fatal error {code:#010x}"),
};

// -- Manual wrappers for @no_wrapper methods --------------------------------

/// Write a byte slice to the platform console.
#[inline(always)]
pub fn console_puts(s: &[u8]) {
    (platform_services().console_puts)(s)
}

/// Enter the platform's unrecoverable-error path. Does not return.
#[inline(always)]
pub fn fatal(code: u32) -> ! {
    (platform_services().fatal)(code)
}
