//! Test doubles for the store, the network and the host.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use routecache_core::{CacheDb, CacheStore, Error, NetworkFetch, Request, RequestKey, Response};
use tokio::sync::Notify;
use url::Url;

use crate::host::LifecycleHost;

pub fn origin() -> Url {
    Url::parse("http://localhost:3000").unwrap()
}

pub fn request(path: &str) -> Request {
    Request::get(origin().join(path).unwrap())
}

/// Network double answering from a per-path script.
///
/// Unscripted paths answer 404. `pause` holds every fetch until `resume`.
#[derive(Default)]
pub struct ScriptedNetwork {
    script: Mutex<HashMap<String, (u16, String)>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    paused: AtomicBool,
    resume: Notify,
}

impl ScriptedNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume.notify_one();
    }

    /// Paths fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkFetch for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        if self.paused.load(Ordering::SeqCst) {
            self.resume.notified().await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let scripted = self.script.lock().unwrap().get(&path).cloned();
        let (status, body) = scripted.unwrap_or((404, "not found".to_string()));
        Ok(Response::new(request.url.clone(), status, vec![("content-type".into(), "text/html".into())], body))
    }
}

/// Store wrapper that fails selected operations.
pub struct FlakyStore {
    inner: CacheDb,
    failing_delete: Option<String>,
    failing_lookups: bool,
}

impl FlakyStore {
    pub fn new(inner: CacheDb) -> Self {
        Self { inner, failing_delete: None, failing_lookups: false }
    }

    pub fn failing_delete(mut self, generation: &str) -> Self {
        self.failing_delete = Some(generation.to_string());
        self
    }

    pub fn failing_lookups(mut self) -> Self {
        self.failing_lookups = true;
        self
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn open(&self, generation: &str) -> Result<(), Error> {
        self.inner.open(generation).await
    }

    async fn put_all(&self, generation: &str, entries: Vec<(RequestKey, Response)>) -> Result<(), Error> {
        self.inner.put_all(generation, entries).await
    }

    async fn lookup(&self, generation: &str, key: &RequestKey) -> Result<Option<Response>, Error> {
        if self.failing_lookups {
            return Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed));
        }
        self.inner.lookup(generation, key).await
    }

    async fn put(&self, generation: &str, key: &RequestKey, response: Response) -> Result<(), Error> {
        self.inner.put(generation, key, response).await
    }

    async fn generations(&self) -> Result<Vec<String>, Error> {
        self.inner.generations().await
    }

    async fn delete(&self, generation: &str) -> Result<bool, Error> {
        if self.failing_delete.as_deref() == Some(generation) {
            return Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed));
        }
        self.inner.delete(generation).await
    }
}

/// Host double recording skip-waiting requests.
#[derive(Default)]
pub struct RecordingHost {
    skips: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn skip_requests(&self) -> Vec<String> {
        self.skips.lock().unwrap().clone()
    }
}

impl LifecycleHost for RecordingHost {
    fn skip_waiting(&self, version: &str) {
        self.skips.lock().unwrap().push(version.to_string());
    }

    fn active_version(&self) -> Option<String> {
        None
    }
}
