//! CLI command implementations.

pub mod bootstrap;
pub mod compact;
pub mod drain;
pub mod dump_queue;
pub mod inspect;
pub mod requeue;
pub mod session;
pub mod watch;
