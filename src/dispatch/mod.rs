//! Request dispatch: one parsed request in, one JSON response out.
//!
//! ```text
//! Received ─► Routed ─► [BodyDecoded] ─► HandlerInvoked ─► Serialized ─► Sent
//!    │           │             │                 │               │
//!    └── 404 ────┘── 400 ──────┘───── 500 ───────┘───── 500 ─────┘
//! ```
//!
//! Every branch ends in a well-formed `application/json` response. Nothing a
//! handler does, including panicking, escapes [`Dispatcher::dispatch`].

use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::context::Context;
use crate::http::{Method, Request, Response, StatusCode};
use crate::json;
use crate::router::{Handler, HandlerResult, RouteTable};

/// Reason a request could not be answered with `200 OK`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route for {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("Invalid JSON: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("{0}")]
    Handler(String),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("{0}")]
    Encode(#[source] serde_json::Error),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NotFound,
            Self::Decode(_) => StatusCode::BadRequest,
            Self::Handler(_) | Self::Panic(_) | Self::Encode(_) => StatusCode::InternalServerError,
        }
    }

    /// Message placed in the `{"error": ...}` body.
    ///
    /// Panic payloads are logged but never sent to the client.
    pub fn client_message(&self) -> String {
        match self {
            Self::NotFound { .. } => StatusCode::NotFound.canonical_reason().to_owned(),
            Self::Panic(_) => StatusCode::InternalServerError
                .canonical_reason()
                .to_owned(),
            other => other.to_string(),
        }
    }

    pub fn into_response(self) -> Response {
        error_response(self.status(), &self.client_message())
    }
}

/// Builds a `{"error": "<message>"}` response.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    Response::json(status, json::error_body(message))
}

/// Turns parsed requests into responses using a shared, read-only [`RouteTable`].
///
/// Cloning is cheap and every clone sees the same table, so a dispatcher can
/// be handed to each connection task.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Handles one request end to end and logs an access line.
    pub fn dispatch(&self, request: Request, peer_addr: Option<SocketAddr>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.path().to_owned();

        let mut ctx = Context::new(request);
        if let Some(addr) = peer_addr {
            ctx = ctx.with_peer_addr(addr);
        }

        let response = match self.try_dispatch(&ctx) {
            Ok(body) => Response::json(StatusCode::Ok, body),
            Err(e) => {
                match &e {
                    DispatchError::NotFound { .. } | DispatchError::Decode(_) => {
                        warn!(%method, path = %path, error = %e, "request rejected");
                    }
                    _ => error!(%method, path = %path, error = %e, "handler failed"),
                }
                e.into_response()
            }
        };

        info!(
            "{} {} - {} ({:?})",
            method,
            path,
            response.status().as_u16(),
            start.elapsed()
        );
        response
    }

    fn try_dispatch(&self, ctx: &Context) -> HandlerResult {
        let handler = self
            .routes
            .lookup(ctx.method(), ctx.path())
            .ok_or_else(|| DispatchError::NotFound {
                method: ctx.method().clone(),
                path: ctx.path().to_owned(),
            })?;

        match handler {
            Handler::Request(f) => invoke(|| f(ctx)),
            Handler::RequestWithBody(f) => {
                let body = decode_body(ctx.body())?;
                invoke(|| f(ctx, body))
            }
        }
    }
}

/// An empty body decodes to `{}`.
fn decode_body(raw: &[u8]) -> Result<Value, DispatchError> {
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(raw).map_err(DispatchError::Decode)
}

fn invoke(call: impl FnOnce() -> HandlerResult) -> HandlerResult {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(DispatchError::Panic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
