//! Function-pointer service tables crossing crate boundaries.
//!
//! The kernel core consumes a small set of primitives it cannot implement
//! itself (interrupt masking, the actual context switch, timer ticks). The
//! architecture layer registers implementations here during early boot; the
//! built-in fallbacks keep everything callable in hosted environments.

pub mod platform;
