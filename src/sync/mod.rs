//! Cross-thread handoff primitives between network workers and the host tick.
//!
//! Workers write, the host reads without ever blocking on the network.

pub mod signal;
pub mod slot;

pub use signal::{AutoResetSignal, StickySignal};
pub use slot::{DedupSlot, PendingSlot};
