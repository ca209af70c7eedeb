#![no_std]

pub mod dispatch;
pub mod msgq;
pub mod resource;
pub mod scheduler;
pub mod sem;
pub mod thread;
pub mod waitq;
pub mod watchdog;

pub mod test_support;

pub mod dispatch_tests;
pub mod resource_tests;
pub mod waitq_tests;

use cadence_lib::{klog_info, percpu};

/// Bring every table to its boot state and select the scheduler policy for
/// the configured processor count.
pub fn kernel_core_initialize(processor_count: usize) {
    percpu::percpu_init(processor_count);
    thread::thread_initialize();
    scheduler::scheduler_initialize(processor_count);
    waitq::waitq_initialize();
    watchdog::watchdog_initialize();
    resource::resource_initialize();
    msgq::msgq_initialize();
    sem::sem_initialize();
    klog_info!("CORE: concurrency nucleus ready");
}
