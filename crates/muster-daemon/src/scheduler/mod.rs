//! Background loops
//!
//! The scheduler owns the two periodic jobs of a registry node:
//! - Eviction sweeps over the lease table
//! - Query cache rebuilds, periodic or nudged early by write bursts

mod sweep;

pub use sweep::Scheduler;
