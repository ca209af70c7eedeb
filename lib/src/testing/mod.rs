pub mod harness;
mod runner;

pub use harness::{HARNESS_MAX_SUITES, SuiteRunnerFn, TestRunSummary, TestSuiteDesc, TestSuiteResult};
pub use runner::run_single_test;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail,
    Skipped,
}

impl TestResult {
    #[inline]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass | Self::Skipped)
    }

    #[inline]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

#[macro_export]
macro_rules! pass {
    () => {
        $crate::testing::TestResult::Pass
    };
}

#[macro_export]
macro_rules! fail {
    () => {
        $crate::testing::TestResult::Fail
    };
    ($msg:expr) => {{
        $crate::klog_info!("TEST FAIL: {}", $msg);
        $crate::testing::TestResult::Fail
    }};
    ($fmt:expr, $($arg:tt)*) => {{
        $crate::klog_info!(concat!("TEST FAIL: ", $fmt), $($arg)*);
        $crate::testing::TestResult::Fail
    }};
}

#[macro_export]
macro_rules! run_test {
    ($passed:expr, $total:expr, $test_fn:path) => {{
        $total += 1;
        let result = $crate::testing::run_single_test(stringify!($test_fn), || $test_fn());
        if result.is_pass() {
            $passed += 1;
        }
        result
    }};

    ($test_fn:expr) => {{ $crate::testing::run_single_test(stringify!($test_fn), || $test_fn()) }};
}

#[macro_export]
macro_rules! define_test_suite {
    ($suite_name:ident, [$($test_fn:path),* $(,)?]) => {
        $crate::paste::paste! {
            pub fn [<run_ $suite_name _suite>](out: &mut $crate::testing::TestSuiteResult) {
                let start = $crate::kernel_services::platform::timer_ticks();
                let mut passed = 0u32;
                let mut total = 0u32;

                $(
                    $crate::run_test!(passed, total, $test_fn);
                )*

                let elapsed = $crate::kernel_services::platform::timer_ticks().wrapping_sub(start);
                out.name = stringify!($suite_name);
                out.fill(passed, total, elapsed);
            }

            pub const [<$suite_name:upper _SUITE>]: $crate::testing::TestSuiteDesc =
                $crate::testing::TestSuiteDesc {
                    name: stringify!($suite_name),
                    run: [<run_ $suite_name _suite>],
                };
        }
    };
}
