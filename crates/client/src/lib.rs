//! Network side of routecache.
//!
//! This crate provides the reqwest-backed implementation of the
//! [`NetworkFetch`](routecache_core::NetworkFetch) contract and route
//! resolution helpers used when populating a generation.

pub mod fetch;

pub use fetch::{FetchConfig, HttpFetcher, UrlError, resolve_route};
