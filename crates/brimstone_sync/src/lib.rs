//! Busy-wait mutual exclusion primitives.
//!
//! Both locks here are intended for critical sections measured in nanoseconds
//! (bump allocations, free-list pushes, pointer swaps). Anything that can
//! block for longer belongs on a real mutex.

pub mod spin_lock;
pub mod ticket_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use ticket_lock::{TicketLock, TicketLockGuard};

/// Pads a value out to its own cache line so lock counters on different
/// lines do not false-share.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct CachePadded<T>(pub T);
