//! # Karobar Sync Engine
//!
//! Moves queued local mutations to the Remote API.
//!
//! This crate provides:
//! - [`RemoteApi`], the seam between the engine and the network, with an
//!   HTTP implementation ([`HttpRemote`] over [`ReqwestClient`]) and a
//!   scripted [`MockRemote`] for tests
//! - [`SyncEngine`], which drains the durable queue oldest-first on a
//!   fixed tick
//! - [`BootstrapSync`], which seeds a fresh device from the consolidated
//!   snapshot
//!
//! ## Drain rules
//!
//! - At most one drain runs at a time (`Idle` → `Draining` → `Idle`)
//! - A tick is skipped while offline or while a drain is in flight
//! - 2xx, 409 and DELETE-404 remove the task; anything else keeps it
//! - Once a task for an entity stays queued, later tasks for the same
//!   entity wait for the next tick
//! - Repeated 4xx rejections dead-letter a task; transient failures
//!   never do
//!
//! The engine reads only the durable queue, never a repository cache.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bootstrap;
mod config;
mod engine;
mod error;
mod http;
mod remote;

pub use bootstrap::{BootstrapReport, BootstrapSync};
pub use config::SyncConfig;
pub use engine::{DrainReport, SkipReason, SyncEngine, SyncHandle, SyncState, SyncStats, TickOutcome};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpRemote, ReqwestClient};
pub use remote::{MockRemote, MockReply, RemoteApi};
