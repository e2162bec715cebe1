//! Stale-while-revalidate route cache controller.
//!
//! This crate provides:
//! - [`LifecycleHandler`], the per-event handler interface
//! - [`CacheController`], the handler that owns the versioned route cache
//! - [`Registration`], an in-process host driving handlers through their lifecycle

pub mod controller;
pub mod handler;
pub mod host;
pub mod message;

#[cfg(test)]
mod testing;

pub use controller::{ActivationReport, CacheController};
pub use handler::{FetchDisposition, LifecycleHandler, Revalidation};
pub use host::{LifecycleHost, Registration};
pub use message::ControlMessage;
