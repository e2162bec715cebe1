//! Lifecycle handler interface.
//!
//! The host delivers four events to a handler and awaits each returned future
//! before it considers the event resolved.

use async_trait::async_trait;
use routecache_core::{Error, Request, Response};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::host::LifecycleHost;

/// One method per lifecycle event.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Version tag of this handler instance.
    fn version(&self) -> &str;

    /// Called once when this version is installed as a candidate.
    ///
    /// An `Err` makes the host discard the candidate.
    async fn on_install(&self) -> Result<(), Error>;

    /// Called when this version takes control.
    async fn on_activate(&self) -> Result<(), Error>;

    /// Called for every outgoing request while this version is active.
    async fn on_fetch(&self, request: &Request) -> Result<FetchDisposition, Error>;

    /// Called for out-of-band messages from pages.
    async fn on_message(&self, message: &Value, host: &dyn LifecycleHost);
}

/// What the handler decided to do with a request.
#[derive(Debug)]
pub enum FetchDisposition {
    /// Not intercepted; the host goes to the network as if no handler existed.
    Passthrough,

    /// Intercepted and answered.
    Respond {
        response: Response,
        /// Background refresh still in flight when the response was served
        /// from cache. Dropping it detaches the task; it keeps running.
        revalidation: Option<Revalidation>,
    },
}

impl FetchDisposition {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchDisposition::Passthrough)
    }

    /// The served response, if intercepted.
    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchDisposition::Passthrough => None,
            FetchDisposition::Respond { response, .. } => Some(response),
        }
    }
}

/// Handle to a background stale-while-revalidate refresh.
///
/// Resolves to the fresh network response, or to the cached snapshot when
/// the network failed.
#[derive(Debug)]
pub struct Revalidation {
    handle: JoinHandle<Result<Response, Error>>,
}

impl Revalidation {
    pub(crate) fn new(handle: JoinHandle<Result<Response, Error>>) -> Self {
        Self { handle }
    }

    /// Wait for the refresh, including its cache write, to finish.
    pub async fn settled(self) -> Result<Response, Error> {
        self.handle
            .await
            .map_err(|e| Error::TaskFailed(format!("revalidation task: {e}")))?
    }
}
