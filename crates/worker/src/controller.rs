//! Cache lifecycle controller.
//!
//! ### Install
//! Fetch every route concurrently and write them to the current generation in
//! one bulk put. Any failed fetch or non-2xx status aborts the whole write.
//! Failure is logged and does not stop the version from activating.
//!
//! ### Activate
//! Delete every generation other than the current one. Deletions run
//! concurrently and fail independently.
//!
//! ### Fetch (stale-while-revalidate)
//! - Non-GET and unrouted requests pass through untouched.
//! - Cache hit: serve the snapshot now, refresh it in a detached task.
//! - Cache miss: await the network; its failure is the request's failure.
//!
//! Concurrent requests for one key are not de-duplicated; each runs its own
//! refresh and the last write wins.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{join_all, try_join_all};
use routecache_client::{FetchConfig, HttpFetcher, resolve_route};
use routecache_core::{
    AppConfig, CacheConfig, CacheDb, CacheStore, Error, NetworkFetch, Request, RequestKey, Response,
};
use serde_json::Value;
use url::Url;

use crate::handler::{FetchDisposition, LifecycleHandler, Revalidation};
use crate::host::LifecycleHost;
use crate::message::ControlMessage;

const PARTIAL_CONTENT: u16 = 206;

/// Outcome of an activation cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    pub retained: String,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// The cache lifecycle controller.
///
/// Cheap to clone; clones share the store and the network primitive.
#[derive(Clone)]
pub struct CacheController {
    config: Arc<CacheConfig>,
    origin: Url,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn NetworkFetch>,
}

impl CacheController {
    pub fn new(config: CacheConfig, origin: Url, store: Arc<dyn CacheStore>, network: Arc<dyn NetworkFetch>) -> Self {
        Self { config: Arc::new(config), origin, store, network }
    }

    /// Build a controller backed by the SQLite store at `db_path` and the
    /// reqwest fetcher.
    pub async fn from_app_config(app: &AppConfig) -> Result<Self, Error> {
        app.validate()?;
        let origin = app.origin_url()?;
        let store = CacheDb::open(&app.db_path).await?;
        let network = HttpFetcher::new(FetchConfig::from(app))?;

        Ok(Self::new(app.cache_config(), origin, Arc::new(store), Arc::new(network)))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether a request is eligible for interception.
    pub fn intercepts(&self, request: &Request) -> bool {
        request.is_get() && self.config.is_routed(request.url.path())
    }

    /// Populate the current generation with every route.
    ///
    /// # Errors
    ///
    /// Returns `Error::Install` naming the first route whose fetch failed or
    /// returned a non-2xx status. Nothing is written in that case.
    pub async fn populate(&self) -> Result<(), Error> {
        let generation = self.config.generation_name();
        self.store.open(&generation).await?;
        tracing::info!(generation = %generation, "cache opened");

        let fetches = self.config.routes().iter().map(|route| async move {
            let url = resolve_route(&self.origin, route).map_err(|e| Error::Install(format!("{route}: {e}")))?;
            let request = Request::get(url);
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| Error::Install(format!("{route}: {e}")))?;
            if !response.is_ok() {
                return Err(Error::Install(format!("{route}: status {}", response.status())));
            }
            Ok((request.key(), response))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        self.store.put_all(&generation, entries).await?;
        tracing::info!(generation = %generation, routes = count, "cache populated");

        Ok(())
    }

    /// Delete every generation except the current one.
    ///
    /// # Errors
    ///
    /// Only enumeration failure is an error; individual deletions that fail
    /// are reported in [`ActivationReport::failed`].
    pub async fn cleanup(&self) -> Result<ActivationReport, Error> {
        let current = self.config.generation_name();
        let stale: Vec<String> = self
            .store
            .generations()
            .await?
            .into_iter()
            .filter(|name| *name != current)
            .collect();

        let outcomes = join_all(stale.into_iter().map(|name| async move {
            tracing::info!(generation = %name, "deleting old cache");
            let outcome = self.store.delete(&name).await;
            (name, outcome)
        }))
        .await;

        let mut report = ActivationReport { retained: current, ..Default::default() };
        for (name, outcome) in outcomes {
            match outcome {
                Ok(_) => report.deleted.push(name),
                Err(e) => {
                    tracing::warn!(generation = %name, error = %e, "failed to delete old cache");
                    report.failed.push(name);
                }
            }
        }

        Ok(report)
    }

    /// Open the current generation and look the key up. Store failures read
    /// as a miss.
    async fn cached_snapshot(&self, key: &RequestKey) -> Option<Response> {
        let generation = self.config.generation_name();
        let lookup = match self.store.open(&generation).await {
            Ok(()) => self.store.lookup(&generation, key).await,
            Err(e) => Err(e),
        };

        match lookup {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url = %key.url(), error = %e, "cache lookup failed");
                None
            }
        }
    }

    async fn store_snapshot(&self, key: &RequestKey, response: Response) -> Result<(), Error> {
        if response.status() == PARTIAL_CONTENT {
            return Err(Error::PartialContent(key.url().to_string()));
        }
        self.store
            .put(&self.config.generation_name(), key, response)
            .await
    }

    /// Fetch from the network and write the result back.
    ///
    /// On network failure the cached snapshot, when there is one, becomes the
    /// result instead of the error.
    async fn revalidate(self, request: Request, cached: Option<Response>) -> Result<Response, Error> {
        match self.network.fetch(&request).await {
            Ok(fresh) => {
                let (fresh, copy) = fresh.tee();
                if let Err(e) = self.store_snapshot(&request.key(), copy).await {
                    tracing::warn!(url = %request.url, error = %e, "failed to store fresh response");
                }
                Ok(fresh)
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "fetch failed");
                cached.ok_or(e)
            }
        }
    }
}

#[async_trait]
impl LifecycleHandler for CacheController {
    fn version(&self) -> &str {
        self.config.version_tag()
    }

    async fn on_install(&self) -> Result<(), Error> {
        if let Err(e) = self.populate().await {
            tracing::error!(error = %e, "cache installation failed");
        }
        Ok(())
    }

    async fn on_activate(&self) -> Result<(), Error> {
        match self.cleanup().await {
            Ok(report) => tracing::debug!(?report, "activation cleanup finished"),
            Err(e) => tracing::warn!(error = %e, "could not enumerate caches"),
        }
        Ok(())
    }

    async fn on_fetch(&self, request: &Request) -> Result<FetchDisposition, Error> {
        if !self.intercepts(request) {
            return Ok(FetchDisposition::Passthrough);
        }

        match self.cached_snapshot(&request.key()).await {
            Some(cached) => {
                let (response, fallback) = cached.tee();
                let refresh = tokio::spawn(self.clone().revalidate(request.clone(), Some(fallback)));
                Ok(FetchDisposition::Respond { response, revalidation: Some(Revalidation::new(refresh)) })
            }
            None => {
                let response = self.clone().revalidate(request.clone(), None).await?;
                Ok(FetchDisposition::Respond { response, revalidation: None })
            }
        }
    }

    async fn on_message(&self, message: &Value, host: &dyn LifecycleHost) {
        match ControlMessage::parse(message) {
            Some(ControlMessage::SkipWaiting) => {
                tracing::info!(version = %self.version(), "skip waiting requested");
                host.skip_waiting(self.version());
            }
            None => tracing::trace!("ignoring unrecognized message"),
        }
    }
}
