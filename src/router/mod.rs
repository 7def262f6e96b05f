//! Route table: exact `(method, path)` lookup of registered handlers.
//!
//! | Registered         | Request            | Result         |
//! |--------------------|--------------------|----------------|
//! | `GET /hello`       | `GET /hello`       | handler        |
//! | `GET /hello`       | `GET /hello/`      | not found      |
//! | `GET /hello`       | `POST /hello`      | not found      |
//! | `GET /hello`       | `GET /hello?x=1`   | not found      |
//!
//! Paths are compared byte-for-byte against the full request target. There is
//! no prefix matching, no trailing-slash normalization, no query-string
//! parsing and no parameter capture.
//!
//! Registering the same `(method, path)` twice replaces the earlier handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::context::Context;
use crate::dispatch::DispatchError;
use crate::http::Method;
use crate::json;

/// Errors returned when a route cannot be registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("unsupported method {method:?}: only GET and POST can be routed")]
    UnsupportedMethod { method: String },

    #[error("invalid route path {path:?}: must be non-empty and start with '/'")]
    InvalidPath { path: String },

    #[error("{method} routes need a {expected} handler")]
    HandlerShape {
        method: Method,
        expected: &'static str,
    },
}

/// Encoded JSON body, or the reason one could not be produced.
pub type HandlerResult = Result<Vec<u8>, DispatchError>;

type RequestFn = dyn Fn(&Context) -> HandlerResult + Send + Sync + 'static;
type RequestWithBodyFn = dyn Fn(&Context, Value) -> HandlerResult + Send + Sync + 'static;

/// A registered route handler.
///
/// The two variants mirror the two route kinds: `GET` handlers see only the
/// request, `POST` handlers additionally receive the decoded JSON body. Each
/// variant wraps a user function returning `Result<T, E>` where `T` is any
/// [`Serialize`] value and `E` is any [`Display`](fmt::Display) error; the
/// wrapper encodes `T` so the dispatcher only ever sees bytes or a
/// [`DispatchError`].
///
/// # Examples
///
/// ```
/// use nanoserver::{Context, Handler};
/// use serde_json::{json, Value};
///
/// let hello = Handler::new(|_ctx: &Context| Ok::<_, String>(json!({"message": "Hello World"})));
/// let echo = Handler::with_body(|_ctx: &Context, data: Value| {
///     Ok::<_, String>(json!({"received": data}))
/// });
///
/// assert!(!hello.expects_body());
/// assert!(echo.expects_body());
/// ```
#[derive(Clone)]
pub enum Handler {
    /// Receives only the request context.
    Request(Arc<RequestFn>),
    /// Receives the request context and the decoded JSON body.
    RequestWithBody(Arc<RequestWithBodyFn>),
}

impl Handler {
    /// Wraps a handler for routes without a body.
    pub fn new<F, T, E>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        Self::Request(Arc::new(move |ctx: &Context| encode(f(ctx))))
    }

    /// Wraps a handler for routes that take a JSON body.
    pub fn with_body<F, T, E>(f: F) -> Self
    where
        F: Fn(&Context, Value) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        Self::RequestWithBody(Arc::new(move |ctx: &Context, body: Value| {
            encode(f(ctx, body))
        }))
    }

    pub fn expects_body(&self) -> bool {
        matches!(self, Self::RequestWithBody(_))
    }

    fn shape(&self) -> &'static str {
        match self {
            Self::Request(_) => "request-only",
            Self::RequestWithBody(_) => "request-with-body",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler").field(&self.shape()).finish()
    }
}

fn encode<T, E>(outcome: Result<T, E>) -> HandlerResult
where
    T: Serialize,
    E: fmt::Display,
{
    let value = outcome.map_err(|e| DispatchError::Handler(e.to_string()))?;
    json::to_vec(&value).map_err(DispatchError::Encode)
}

// A registered route, kept in registration order for listing.
struct Route {
    method: Method,
    path: String,
    handler: Handler,
}

/// Owns every registered route for the lifetime of the server.
///
/// Mutated only during setup; shared read-only with the dispatcher once
/// serving starts.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    // method -> path -> position in `routes`
    index: HashMap<Method, HashMap<String, usize>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(method, path)`, replacing any existing entry.
    ///
    /// # Errors
    ///
    /// - [`RouteError::UnsupportedMethod`]: `method` is neither `GET` nor `POST`.
    /// - [`RouteError::InvalidPath`]: `path` is empty or lacks a leading `/`.
    /// - [`RouteError::HandlerShape`]: a `GET` route was given a body handler,
    ///   or a `POST` route a request-only one.
    pub fn register(
        &mut self,
        method: Method,
        path: &str,
        handler: Handler,
    ) -> Result<(), RouteError> {
        if !method.is_routable() {
            return Err(RouteError::UnsupportedMethod {
                method: method.as_str().to_owned(),
            });
        }
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath {
                path: path.to_owned(),
            });
        }
        if handler.expects_body() != method.expects_body() {
            let expected = if method.expects_body() {
                "request-with-body"
            } else {
                "request-only"
            };
            return Err(RouteError::HandlerShape { method, expected });
        }

        let paths = self.index.entry(method.clone()).or_default();
        match paths.get(path) {
            Some(&slot) => {
                warn!(%method, path, "route already registered, replacing handler");
                self.routes[slot].handler = handler;
            }
            None => {
                paths.insert(path.to_owned(), self.routes.len());
                self.routes.push(Route {
                    method: method.clone(),
                    path: path.to_owned(),
                    handler,
                });
            }
        }

        info!("Registered {method} {path}");
        Ok(())
    }

    /// Returns the handler registered for exactly `(method, path)`.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<&Handler> {
        let slot = *self.index.get(method)?.get(path)?;
        Some(&self.routes[slot].handler)
    }

    /// Registered `(method, path)` pairs in first-registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.path.as_str()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.routes().map(|(m, p)| format!("{m} {p}")))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn get_handler(tag: &'static str) -> Handler {
        Handler::new(move |_ctx: &Context| Ok::<_, String>(json!({ "tag": tag })))
    }

    fn post_handler() -> Handler {
        Handler::with_body(|_ctx: &Context, body: Value| Ok::<_, String>(body))
    }

    fn call(handler: &Handler) -> String {
        let (req, _) = crate::http::Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let ctx = Context::new(req);
        let bytes = match handler {
            Handler::Request(f) => f(&ctx),
            Handler::RequestWithBody(f) => f(&ctx, json!({})),
        }
        .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn starts_empty() {
        let table = RouteTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert!(table.lookup(&Method::Get, "/").is_none());
    }

    #[test]
    fn exact_lookup() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/hello", get_handler("a")).unwrap();
        table.register(Method::Post, "/hello", post_handler()).unwrap();

        assert!(!table.lookup(&Method::Get, "/hello").unwrap().expects_body());
        assert!(table.lookup(&Method::Post, "/hello").unwrap().expects_body());
        assert!(table.lookup(&Method::Get, "/hello/").is_none());
        assert!(table.lookup(&Method::Get, "/Hello").is_none());
        assert!(table.lookup(&Method::Get, "/hell").is_none());
        assert!(table.lookup(&Method::Other("PUT".into()), "/hello").is_none());
    }

    #[test]
    fn reregistration_replaces_handler() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/v", get_handler("first")).unwrap();
        table.register(Method::Get, "/other", get_handler("x")).unwrap();
        table.register(Method::Get, "/v", get_handler("second")).unwrap();

        assert_eq!(table.len(), 2);
        let handler = table.lookup(&Method::Get, "/v").unwrap();
        assert_eq!(call(handler), r#"{"tag": "second"}"#);

        // Listing keeps the first registration position.
        let listed: Vec<_> = table.routes().map(|(m, p)| format!("{m} {p}")).collect();
        assert_eq!(listed, ["GET /v", "GET /other"]);
    }

    #[test]
    fn rejects_unsupported_method() {
        let mut table = RouteTable::new();
        let err = table
            .register(Method::Other("PUT".into()), "/x", get_handler("x"))
            .unwrap_err();
        assert_eq!(err, RouteError::UnsupportedMethod { method: "PUT".into() });
        assert!(table.is_empty());
    }

    #[test]
    fn rejects_bad_paths() {
        let mut table = RouteTable::new();
        for path in ["", "hello", "*"] {
            let err = table.register(Method::Get, path, get_handler("x")).unwrap_err();
            assert_eq!(err, RouteError::InvalidPath { path: path.into() });
        }
        table.register(Method::Get, "/", get_handler("root")).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rejects_mismatched_handler_shape() {
        let mut table = RouteTable::new();
        assert!(matches!(
            table.register(Method::Get, "/x", post_handler()),
            Err(RouteError::HandlerShape { method: Method::Get, .. })
        ));
        assert!(matches!(
            table.register(Method::Post, "/x", get_handler("x")),
            Err(RouteError::HandlerShape { method: Method::Post, .. })
        ));
    }

    #[test]
    fn handler_error_and_encode_failure_are_distinguished() {
        let failing = Handler::new(|_ctx: &Context| Err::<Value, _>("boom"));
        let unencodable = Handler::new(|_ctx: &Context| {
            let mut map = std::collections::BTreeMap::new();
            map.insert((1, 2), "tuple keys are not JSON");
            Ok::<_, String>(map)
        });
        let (req, _) = crate::http::Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let ctx = Context::new(req);

        let Handler::Request(f) = failing else { unreachable!() };
        assert!(matches!(f(&ctx), Err(DispatchError::Handler(msg)) if msg == "boom"));

        let Handler::Request(f) = unencodable else { unreachable!() };
        assert!(matches!(f(&ctx), Err(DispatchError::Encode(_))));
    }
}
