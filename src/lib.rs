//! pbcache - tenant-scoped, stale-while-revalidate caching for PocketBase
//!
//! The library half holds the cache layers, the reactive accessor and
//! operation wrapper, the record API clients and the session lifecycle. The
//! `pbcache` binary wires them into a command-line client.

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod reactive;
pub mod session;

pub use error::{Error, Result};
