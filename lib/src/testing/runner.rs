use super::TestResult;
use crate::{klog_debug, klog_info};

/// Execute one test function and log its outcome.
pub fn run_single_test(name: &str, test: impl FnOnce() -> TestResult) -> TestResult {
    klog_debug!("TEST: {} ...", name);
    let result = test();
    match result {
        TestResult::Pass => klog_debug!("TEST: {} ok", name),
        TestResult::Skipped => klog_debug!("TEST: {} skipped", name),
        TestResult::Fail => klog_info!("TEST: {} FAILED", name),
    }
    result
}
