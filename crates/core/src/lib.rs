//! Core types and shared functionality for routecache.
//!
//! This crate provides:
//! - The request/response model and the network fetch contract
//! - The generation store contract with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;

pub use cache::{CacheDb, CacheStore};
pub use config::{AppConfig, CacheConfig, ConfigError};
pub use error::Error;
pub use http::{NetworkFetch, Request, RequestKey, Response};
