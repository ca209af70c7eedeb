//! Unrecoverable-error escalation.
//!
//! Internal-consistency violations (nesting underflow, non-LIFO resource
//! release, ownership cycles) cannot be reported as ordinary status values:
//! continuing would corrupt state shared by every processor. This path logs
//! the diagnostic and hands control to the platform's fatal hook, which does
//! not return.

use cadence_abi::FatalCode;

use crate::kernel_services::platform;
use crate::klog_error;

pub fn kernel_fatal(code: FatalCode) -> ! {
    klog_error!("FATAL: {} ({:#010x})", code.as_str(), code.as_u32());
    platform::fatal(code.as_u32())
}
