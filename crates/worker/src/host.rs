//! In-process lifecycle host.
//!
//! [`Registration`] tracks which handler version is active and which one is
//! waiting, and drives the handler through install, activate, fetch and
//! message events. A waiting version activates when:
//! - nothing is active yet,
//! - no page is controlled by the active version, or
//! - the waiting version asked to skip waiting.

use std::sync::{Mutex, MutexGuard, PoisonError};

use routecache_core::{Error, NetworkFetch, Request, Response};
use serde_json::Value;

use crate::handler::{FetchDisposition, LifecycleHandler};

/// What a handler may ask of its host.
pub trait LifecycleHost: Send + Sync {
    /// Activate `version` as soon as it is waiting, without waiting for
    /// controlled pages to release the current version. No effect on a
    /// version that is already active.
    fn skip_waiting(&self, version: &str);

    /// Version currently in control.
    fn active_version(&self) -> Option<String>;
}

#[derive(Debug, Default)]
struct RegistrationState {
    active: Option<String>,
    waiting: Option<String>,
    skip_waiting: Option<String>,
    activating: bool,
    controlled_clients: usize,
}

impl RegistrationState {
    fn ready_to_activate(&self, version: &str) -> bool {
        if self.activating || self.waiting.as_deref() != Some(version) {
            return false;
        }
        self.active.is_none() || self.controlled_clients == 0 || self.skip_waiting.as_deref() == Some(version)
    }
}

/// Single-scope registration.
#[derive(Debug, Default)]
pub struct Registration {
    state: Mutex<RegistrationState>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistrationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn waiting_version(&self) -> Option<String> {
        self.state().waiting.clone()
    }

    pub fn controlled_clients(&self) -> usize {
        self.state().controlled_clients
    }

    /// Install `handler` as a candidate, then activate it if nothing holds it back.
    ///
    /// # Errors
    ///
    /// Propagates `on_install` failure; the candidate is discarded.
    pub async fn install<H>(&self, handler: &H) -> Result<(), Error>
    where
        H: LifecycleHandler + ?Sized,
    {
        let version = handler.version().to_string();
        tracing::info!(version = %version, "installing");

        if let Err(e) = handler.on_install().await {
            tracing::error!(version = %version, error = %e, "install failed, discarding version");
            return Err(e);
        }

        {
            let mut state = self.state();
            if let Some(replaced) = state.waiting.replace(version.clone()) {
                tracing::debug!(version = %replaced, "waiting version replaced");
            }
        }
        tracing::info!(version = %version, "installed, waiting");

        self.try_activate(handler).await.map(|_| ())
    }

    /// Activate `handler` if it is waiting and allowed to take over.
    ///
    /// Returns whether activation happened.
    pub async fn try_activate<H>(&self, handler: &H) -> Result<bool, Error>
    where
        H: LifecycleHandler + ?Sized,
    {
        let version = handler.version();
        {
            let mut state = self.state();
            if !state.ready_to_activate(version) {
                return Ok(false);
            }
            state.activating = true;
        }

        let outcome = handler.on_activate().await;

        {
            let mut state = self.state();
            state.activating = false;
            state.active = Some(version.to_string());
            if state.waiting.as_deref() == Some(version) {
                state.waiting = None;
            }
            if state.skip_waiting.as_deref() == Some(version) {
                state.skip_waiting = None;
            }
        }

        match &outcome {
            Ok(()) => tracing::info!(version = %version, "activated"),
            Err(e) => tracing::warn!(version = %version, error = %e, "activated with failed cleanup"),
        }
        outcome.map(|()| true)
    }

    /// Deliver a message to `handler`, then re-check activation.
    pub async fn post_message<H>(&self, handler: &H, message: &Value) -> Result<(), Error>
    where
        H: LifecycleHandler + ?Sized,
    {
        handler.on_message(message, self).await;
        self.try_activate(handler).await.map(|_| ())
    }

    /// A page came under control of the active version.
    pub fn claim_client(&self) {
        self.state().controlled_clients += 1;
    }

    /// A page went away; the waiting `handler` may take over once none remain.
    pub async fn release_client<H>(&self, handler: &H) -> Result<(), Error>
    where
        H: LifecycleHandler + ?Sized,
    {
        {
            let mut state = self.state();
            state.controlled_clients = state.controlled_clients.saturating_sub(1);
        }
        self.try_activate(handler).await.map(|_| ())
    }

    /// Resolve a page request.
    ///
    /// Only the active version sees requests. Anything it does not intercept
    /// goes to `network` directly.
    pub async fn dispatch_fetch<H>(
        &self, handler: &H, request: &Request, network: &dyn NetworkFetch,
    ) -> Result<Response, Error>
    where
        H: LifecycleHandler + ?Sized,
    {
        let is_active = self.state().active.as_deref() == Some(handler.version());
        if !is_active {
            return network.fetch(request).await;
        }

        match handler.on_fetch(request).await? {
            FetchDisposition::Passthrough => network.fetch(request).await,
            FetchDisposition::Respond { response, .. } => Ok(response),
        }
    }
}

impl LifecycleHost for Registration {
    fn skip_waiting(&self, version: &str) {
        let mut state = self.state();
        if state.active.as_deref() == Some(version) {
            return;
        }
        state.skip_waiting = Some(version.to_string());
    }

    fn active_version(&self) -> Option<String> {
        self.state().active.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::CacheController;
    use crate::testing::{ScriptedNetwork, origin, request};
    use async_trait::async_trait;
    use routecache_core::{CacheConfig, CacheDb, CacheStore};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn routes() -> [&'static str; 3] {
        ["/", "/users", "/events"]
    }

    fn controller(version: &str, db: &CacheDb, network: &Arc<ScriptedNetwork>) -> CacheController {
        let network: Arc<dyn NetworkFetch> = network.clone();
        CacheController::new(CacheConfig::new(version, routes()), origin(), Arc::new(db.clone()), network)
    }

    fn scripted() -> Arc<ScriptedNetwork> {
        let network = ScriptedNetwork::new();
        network.respond("/", 200, "home");
        network.respond("/users", 200, "users");
        network.respond("/events", 200, "events");
        network
    }

    /// Registration with `v0` active and one page under its control.
    async fn with_controlled_v0(db: &CacheDb, network: &Arc<ScriptedNetwork>) -> Registration {
        let registration = Registration::new();
        registration.install(&controller("v0", db, network)).await.unwrap();
        registration.claim_client();
        registration
    }

    #[tokio::test]
    async fn test_first_install_activates_immediately() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = Registration::new();

        registration.install(&controller("v1", &db, &network)).await.unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v1"));
        assert!(registration.waiting_version().is_none());
        assert_eq!(db.entry_count("app-cache-v1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_new_version_waits_for_controlled_pages() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = with_controlled_v0(&db, &network).await;

        registration.install(&controller("v1", &db, &network)).await.unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v0"));
        assert_eq!(registration.waiting_version().as_deref(), Some("v1"));
        let mut names = db.generations().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["app-cache-v0".to_string(), "app-cache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_forces_activation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = with_controlled_v0(&db, &network).await;
        let v1 = controller("v1", &db, &network);
        registration.install(&v1).await.unwrap();

        registration
            .post_message(&v1, &json!({ "type": "SKIP_WAITING" }))
            .await
            .unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v1"));
        assert!(registration.waiting_version().is_none());
        assert_eq!(registration.controlled_clients(), 1);
        assert_eq!(db.generations().await.unwrap(), vec!["app-cache-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_unrecognized_message_keeps_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = with_controlled_v0(&db, &network).await;
        let v1 = controller("v1", &db, &network);
        registration.install(&v1).await.unwrap();

        registration
            .post_message(&v1, &json!({ "type": "REFRESH" }))
            .await
            .unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v0"));
        assert_eq!(registration.waiting_version().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_skip_waiting_from_active_version_is_noop() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = with_controlled_v0(&db, &network).await;
        let v0 = controller("v0", &db, &network);

        registration
            .post_message(&v0, &json!({ "type": "SKIP_WAITING" }))
            .await
            .unwrap();
        registration.install(&controller("v1", &db, &network)).await.unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v0"));
        assert_eq!(registration.waiting_version().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_release_last_client_activates_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = with_controlled_v0(&db, &network).await;
        let v1 = controller("v1", &db, &network);
        registration.install(&v1).await.unwrap();

        registration.release_client(&v1).await.unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v1"));
        assert_eq!(registration.controlled_clients(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_passthrough_goes_to_network() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = Registration::new();
        let v1 = controller("v1", &db, &network);
        registration.install(&v1).await.unwrap();

        let post = Request::new("POST", request("/users").url);
        let response = registration.dispatch_fetch(&v1, &post, network.as_ref()).await.unwrap();
        assert_eq!(response.body(), b"users");

        let unrouted = request("/about");
        let response = registration
            .dispatch_fetch(&v1, &unrouted, network.as_ref())
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_dispatch_serves_from_cache_when_offline() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = Registration::new();
        let v1 = controller("v1", &db, &network);
        registration.install(&v1).await.unwrap();

        network.go_offline();
        let response = registration
            .dispatch_fetch(&v1, &request("/events"), network.as_ref())
            .await
            .unwrap();
        assert_eq!(response.body(), b"events");
    }

    #[tokio::test]
    async fn test_dispatch_ignores_inactive_handler() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = scripted();
        let registration = with_controlled_v0(&db, &network).await;
        let v1 = controller("v1", &db, &network);
        registration.install(&v1).await.unwrap();

        network.go_offline();
        let result = registration.dispatch_fetch(&v1, &request("/users"), network.as_ref()).await;
        assert!(result.unwrap_err().is_network());
    }

    struct BrokenInstall;

    #[async_trait]
    impl LifecycleHandler for BrokenInstall {
        fn version(&self) -> &str {
            "broken"
        }

        async fn on_install(&self) -> Result<(), Error> {
            Err(Error::Install("boom".into()))
        }

        async fn on_activate(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn on_fetch(&self, _request: &Request) -> Result<FetchDisposition, Error> {
            Ok(FetchDisposition::Passthrough)
        }

        async fn on_message(&self, _message: &Value, _host: &dyn LifecycleHost) {}
    }

    /// Handler whose `on_activate` can be held open on a gate.
    struct Gated {
        version: &'static str,
        gate: Option<Arc<Notify>>,
        entered: Notify,
        activations: AtomicUsize,
    }

    impl Gated {
        fn new(version: &'static str, gate: Option<Arc<Notify>>) -> Self {
            Self { version, gate, entered: Notify::new(), activations: AtomicUsize::new(0) }
        }

        fn activations(&self) -> usize {
            self.activations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LifecycleHandler for Gated {
        fn version(&self) -> &str {
            self.version
        }

        async fn on_install(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn on_activate(&self) -> Result<(), Error> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(())
        }

        async fn on_fetch(&self, _request: &Request) -> Result<FetchDisposition, Error> {
            Ok(FetchDisposition::Passthrough)
        }

        async fn on_message(&self, _message: &Value, _host: &dyn LifecycleHost) {}
    }

    #[tokio::test]
    async fn test_install_during_activation_keeps_activated_version() {
        let registration = Registration::new();
        let gate = Arc::new(Notify::new());
        let v1 = Gated::new("v1", Some(gate.clone()));
        let v2 = Gated::new("v2", None);

        let first = registration.install(&v1);
        let second = async {
            v1.entered.notified().await;
            registration.install(&v2).await.unwrap();
            assert_eq!(registration.waiting_version().as_deref(), Some("v2"));
            gate.notify_one();
        };
        let (installed, ()) = tokio::join!(first, second);
        installed.unwrap();

        assert_eq!(registration.active_version().as_deref(), Some("v1"));
        assert_eq!(registration.waiting_version().as_deref(), Some("v2"));
        assert_eq!(v1.activations(), 1);
        assert_eq!(v2.activations(), 0);

        assert!(registration.try_activate(&v2).await.unwrap());
        assert_eq!(registration.active_version().as_deref(), Some("v2"));
        assert!(registration.waiting_version().is_none());
        assert_eq!(v2.activations(), 1);
    }

    #[tokio::test]
    async fn test_failed_install_is_discarded() {
        let registration = Registration::new();
        assert!(registration.install(&BrokenInstall).await.is_err());
        assert!(registration.active_version().is_none());
        assert!(registration.waiting_version().is_none());
    }
}
