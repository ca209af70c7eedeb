#![no_std]

pub mod sem_tests;

pub use cadence_lib::testing::{
    HARNESS_MAX_SUITES, TestRunSummary, TestSuiteDesc, TestSuiteResult,
};
use cadence_lib::klog_info;

pub const TESTS_MAX_SUITES: usize = HARNESS_MAX_SUITES;

/// Every built-in suite, in dependency order: the lower layers first so a
/// broken primitive fails close to its own tests.
pub const ALL_SUITES: [TestSuiteDesc; 6] = [
    cadence_core::dispatch_tests::DISPATCH_SUITE,
    cadence_core::sched_tests::SCHED_SUITE,
    cadence_core::waitq_tests::WAITQ_SUITE,
    cadence_core::resource_tests::RESOURCE_SUITE,
    cadence_core::msgq_tests::MSGQ_SUITE,
    sem_tests::SEM_SUITE,
];

/// Run every registered suite. Returns 0 when everything passed.
pub fn tests_run_all(summary: &mut TestRunSummary) -> i32 {
    *summary = TestRunSummary::default();

    klog_info!("TESTS: starting {} suite(s)", ALL_SUITES.len());
    for desc in ALL_SUITES.iter() {
        let mut result = TestSuiteResult::default();
        (desc.run)(&mut result);
        klog_info!(
            "TESTS: {} — {}/{} passed",
            result.name,
            result.passed,
            result.total
        );
        summary.record(&result);
    }

    if summary.all_passed() {
        klog_info!("TESTS: all {} test(s) passed", summary.total);
        0
    } else {
        klog_info!(
            "TESTS: {} of {} test(s) FAILED",
            summary.failed,
            summary.total
        );
        -1
    }
}
