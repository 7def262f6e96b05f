//! Per-request context handed to route handlers.

use std::net::SocketAddr;

use serde::de::DeserializeOwned;

use crate::http::{Headers, Method, Request};

/// Read-only view of one request, valid for the duration of a single dispatch.
///
/// For `POST` routes the decoded body is passed to the handler separately as a
/// [`serde_json::Value`]; [`Context::json`] is available when a typed view of
/// the same bytes is more convenient.
#[derive(Debug)]
pub struct Context {
    request: Request,
    peer_addr: Option<SocketAddr>,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            peer_addr: None,
        }
    }

    /// Records the remote address of the connection the request arrived on.
    #[must_use]
    pub fn with_peer_addr(mut self, peer_addr: SocketAddr) -> Self {
        self.peer_addr = Some(peer_addr);
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Request target as sent, query string included.
    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn headers(&self) -> &Headers {
        self.request.headers()
    }

    /// Raw body bytes exactly as received.
    pub fn body(&self) -> &[u8] {
        self.request.body()
    }

    /// `None` when the context was built outside a live connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Deserializes the body into `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}
