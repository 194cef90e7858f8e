//! # Karobar Sync Server
//!
//! Reference Remote API for Karobar, run in-process.
//!
//! This crate provides:
//! - The four collection endpoints (`/api/parties`, `/api/products`,
//!   `/api/units`, `/api/companies`) with POST / PUT / DELETE / GET
//! - The consolidated bootstrap snapshot at `/api/sync`
//! - Bearer session tokens signed with HMAC-SHA256, each scoped to one
//!   business
//! - Fault injection for exercising the client's retry paths
//!
//! # Contract
//!
//! - POST of an identifier that already exists answers 409
//! - PUT of an unknown identifier answers 404
//! - DELETE always answers 200, whether or not the entity existed
//! - Missing required fields answer 400, a bad session answers 401
//!
//! Every entity is stored as the JSON the client sent, plus the
//! `businessId` of the session that wrote it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod tables;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::{Fault, RequestRecord, SyncServer};
pub use tables::{BusinessTables, ServerTables};
