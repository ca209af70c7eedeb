#![no_std]

pub mod fatal;
pub mod giant;
pub mod init_flag;
pub mod kernel_services;
pub mod klog;
pub mod percpu;
pub mod service_cell;
pub mod service_macro;
pub mod spinlock;
pub mod testing;

#[doc(hidden)]
pub use paste;

pub use fatal::kernel_fatal;
pub use giant::{
    giant_acquire, giant_drop, giant_is_owner, giant_nest_level, giant_release,
};
pub use init_flag::{InitFlag, StateFlag};
pub use klog::{
    KlogLevel, klog_get_level, klog_init, klog_is_enabled, klog_register_backend, klog_set_level,
};
pub use percpu::{
    MAX_CPUS, PerCpuControl, cpu_count, current_per_cpu, current_processor_index, per_cpu,
    percpu_init,
};
pub use service_cell::ServiceCell;
pub use spinlock::{IrqMutex, IrqMutexGuard};
