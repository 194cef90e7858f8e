//! # Karobar Storage
//!
//! Byte-level storage backends underneath the Karobar local store.
//!
//! A backend is an **opaque append-only log**: it knows nothing about
//! collections, transactions or sync tasks. The local store in
//! `karobar_core` owns the record format and replays it on open.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral stores and tests
//! - [`FileBackend`] - a single log file that survives process restarts
//!
//! ## Example
//!
//! ```rust
//! use karobar_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"begin").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"begin");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
