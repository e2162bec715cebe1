//! The cache store contract the controller is written against.

use async_trait::async_trait;

use crate::Error;
use crate::http::{RequestKey, Response};

/// Key-value store partitioned into named generations.
///
/// Writes are atomic per key; concurrent writers to the same key are
/// last-writer-wins. Stored responses must come back byte-exact.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open the named generation, creating it if absent.
    async fn open(&self, generation: &str) -> Result<(), Error>;

    /// Store every entry or none of them.
    async fn put_all(&self, generation: &str, entries: Vec<(RequestKey, Response)>) -> Result<(), Error>;

    /// Look up a single key.
    async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<Response>, Error>;

    /// Store a single entry, replacing any previous snapshot under the key.
    async fn put(&self, generation: &str, key: &RequestKey, response: Response) -> Result<(), Error>;

    /// Names of every generation known to the store.
    async fn generations(&self) -> Result<Vec<String>, Error>;

    /// Delete a generation with all of its entries. Returns whether it existed.
    async fn delete(&self, generation: &str) -> Result<bool, Error>;
}
