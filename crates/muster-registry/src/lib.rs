//! muster-registry - Lease store and registry core
//!
//! This crate implements the heart of a muster node:
//!
//! - **LeaseStore**: concurrent lease table bucketed by service
//! - **RenewalTracker**: renewal rate accounting and self-preservation
//! - **Eviction sweeper**: expiry planning with oldest-first capping
//! - **QueryCache**: immutable read snapshots behind an atomic pointer
//! - **Registry**: the facade every handler and peer write goes through
//!
//! ## Time handling
//!
//! Every operation that reasons about expiry takes the current time as
//! an argument. The daemon passes wall-clock time; tests pass synthetic
//! timestamps and never sleep.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
pub mod error;
pub mod registry;
pub mod store;
pub mod sweeper;
pub mod tracker;

// Re-exports
pub use cache::{QueryCache, RegistrySnapshot};
pub use error::{RegistryError, Result};
pub use registry::{Registry, RegistryConfig, RegistryStats};
pub use store::{LeaseStore, RemoteApply};
pub use sweeper::SweepOutcome;
pub use tracker::RenewalTracker;
