//! # Karobar Sync Protocol
//!
//! Shared vocabulary between the local store, the sync engine and the
//! Remote API.
//!
//! This crate provides:
//! - [`SyncTask`], the durable record of one local mutation awaiting
//!   replication, and its [`Verb`] / [`TaskStatus`]
//! - [`RemoteRequest`] / [`RemoteResponse`], the HTTP-shaped exchange
//! - [`classify`], which maps a response status onto a [`Delivery`]
//!   outcome
//! - [`BootstrapSnapshot`], the consolidated remote state pulled on a
//!   fresh device
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod delivery;
pub mod endpoints;
mod error;
mod message;
mod snapshot;
mod task;

pub use delivery::{classify, Delivery};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Method, RemoteRequest, RemoteResponse};
pub use snapshot::BootstrapSnapshot;
pub use task::{SequenceId, SyncTask, TaskStatus, Verb};
