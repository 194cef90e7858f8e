//! # Karobar Core
//!
//! The local half of Karobar's offline-first sync.
//!
//! This crate provides:
//! - [`LocalStore`]: a WAL-backed transactional store with named
//!   collections (`parties`, `products`, `units`, `companies`,
//!   `business`, `pendingSync`, `meta`)
//! - [`SyncQueue`]: the durable, ordered list of remote operations
//! - [`Repository`]: per-kind CRUD that pairs each mutation with its
//!   sync task in one transaction
//! - [`models`]: typed views of the stored entities
//!
//! Nothing here talks to the network; see `karobar_sync_engine`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
#[cfg(feature = "std")]
mod dir;
mod error;
pub mod meta;
pub mod models;
mod queue;
mod repository;
mod store;
mod types;
pub mod wal;

pub use config::Config;
#[cfg(feature = "std")]
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult};
pub use queue::{QueueDepth, SyncQueue};
pub use repository::{Companies, EntityKind, Parties, Products, Repository, Units, ID_FIELD};
pub use store::{LocalStore, Transaction};
pub use types::{
    CollectionDef, Document, Key, Schema, BUSINESS, COMPANIES, META, PARTIES, PENDING_SYNC,
    PRODUCTS, UNITS,
};
