//! Test harness types: suite results, descriptors and run summaries.
//!
//! Suites are declared with `define_test_suite!` and collected into an
//! explicit registry array by the tests crate.

/// Maximum number of test suites a registry may hold.
pub const HARNESS_MAX_SUITES: usize = 40;

/// Result of executing a single test suite.
#[derive(Clone, Copy)]
pub struct TestSuiteResult {
    pub name: &'static str,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub elapsed_ticks: u64,
}

impl Default for TestSuiteResult {
    fn default() -> Self {
        Self {
            name: "",
            total: 0,
            passed: 0,
            failed: 0,
            elapsed_ticks: 0,
        }
    }
}

impl TestSuiteResult {
    /// Fill in results from a (passed, total) pair and elapsed time.
    pub fn fill(&mut self, passed: u32, total: u32, elapsed_ticks: u64) {
        self.total = total;
        self.passed = passed;
        self.failed = total.saturating_sub(passed);
        self.elapsed_ticks = elapsed_ticks;
    }

    /// Check if all tests in this suite passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

pub type SuiteRunnerFn = fn(&mut TestSuiteResult);

#[derive(Clone, Copy)]
pub struct TestSuiteDesc {
    pub name: &'static str,
    pub run: SuiteRunnerFn,
}

/// Aggregate outcome of a whole registry run.
#[derive(Clone, Copy, Default)]
pub struct TestRunSummary {
    pub suites_run: u32,
    pub suites_failed: u32,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

impl TestRunSummary {
    pub fn record(&mut self, result: &TestSuiteResult) {
        self.suites_run += 1;
        if !result.all_passed() {
            self.suites_failed += 1;
        }
        self.total += result.total;
        self.passed += result.passed;
        self.failed += result.failed;
    }

    pub fn all_passed(&self) -> bool {
        self.suites_failed == 0
    }
}
