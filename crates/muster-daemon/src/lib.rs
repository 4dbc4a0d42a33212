//! muster-daemon - The musterd registry node
//!
//! Hosting layer for a muster registry node: the axum REST API for
//! clients and peers, configuration loading, the background scheduler
//! driving eviction sweeps and cache rebuilds, and server lifecycle
//! with graceful shutdown. All registry semantics live in
//! `muster-registry` and `muster-replication`; this crate only frames
//! them as a process.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, DaemonResult};
pub use server::Server;
