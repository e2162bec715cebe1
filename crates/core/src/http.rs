//! Request and response model shared by the store, the fetcher and the controller.
//!
//! ### Single-read bodies
//! A [`Response`] is not `Clone`. Its body is an owned, immutable [`Bytes`]
//! buffer and reading it consumes the response. Code that needs to both
//! return a response and store it must call [`Response::tee`] first, which
//! yields two independent views over the same underlying bytes.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::Error;
use crate::cache::hash::compute_entry_key;

/// An outgoing request observed by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self { method: method.into(), url }
    }

    /// Shorthand for a GET request.
    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// Canonical (method, URL) key addressing a stored snapshot.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Canonical request key.
///
/// The method is upper-cased and the URL fragment dropped, so `/users#top`
/// and `/users` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self { method: method.to_ascii_uppercase(), url: url.into() }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// SHA-256 digest used as the storage primary key.
    pub fn digest(&self) -> String {
        compute_entry_key(&self.method, &self.url)
    }
}

/// A fully buffered response.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
    url: Url,
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(url: Url, status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { url, status, headers, body: body.into() }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for 2xx statuses.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup; returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Peek at the body without consuming the response.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consume the response, yielding its body.
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Split into two independent responses sharing the same body buffer.
    pub fn tee(self) -> (Response, Response) {
        let copy = Response {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        };
        (self, copy)
    }
}

/// The network fetch primitive.
///
/// HTTP error statuses are successful fetches; only transport problems
/// (and timeouts) are reported as `Err`.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}
