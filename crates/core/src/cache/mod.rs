//! Generation-partitioned response store.
//!
//! - [`CacheStore`] is the contract the controller depends on
//! - [`CacheDb`] implements it on SQLite via tokio-rusqlite
//! - Entries are keyed by a SHA-256 digest of the canonical request key
//! - Deleting a generation cascades to all of its entries

pub mod connection;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use store::CacheStore;
