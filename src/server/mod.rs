//! The API server: route registration plus an async HTTP/1.1 transport.
//!
//! Routes are registered on an [`ApiServer`] during a single-threaded setup
//! phase. [`ApiServer::bind`] freezes the table into a [`Dispatcher`] and
//! opens the listener; from then on each accepted connection gets its own
//! Tokio task, and each request on it is dispatched on the blocking pool so a
//! slow handler never stalls the reactor. HTTP/1.1 keep-alive is honoured.

use std::future::Future;
use std::net::SocketAddr;

use bytes::BytesMut;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::Context;
use crate::dispatch::{Dispatcher, error_response};
use crate::http::{
    Method, StatusCode,
    request::{Request, RequestError},
};
use crate::router::{Handler, RouteError, RouteTable};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// A JSON API server under construction.
///
/// # Examples
///
/// ```rust,no_run
/// use nanoserver::{ApiServer, Context};
/// use serde_json::{json, Value};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = ApiServer::new("127.0.0.1", 8000);
///     server
///         .get("/hello", |_ctx: &Context| Ok::<_, String>(json!({"message": "Hello World"})))?
///         .post("/echo", |_ctx: &Context, data: Value| Ok::<_, String>(json!({"received": data})))?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Default)]
pub struct ApiServer {
    config: ServerConfig,
    routes: RouteTable,
}

impl ApiServer {
    /// Creates a server that will listen on `host:port` with no routes.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_config(ServerConfig::new(host, port))
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            routes: RouteTable::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Registers `handler` for `method` (case-insensitive) and `path`.
    ///
    /// Registering an existing `(method, path)` pair replaces its handler.
    ///
    /// # Errors
    ///
    /// See [`RouteTable::register`].
    pub fn add_route(
        &mut self,
        method: impl AsRef<str>,
        path: &str,
        handler: Handler,
    ) -> Result<&mut Self, RouteError> {
        let method = match method.as_ref().parse::<Method>() {
            Ok(method) => method,
            Err(never) => match never {},
        };
        self.routes.register(method, path, handler)?;
        Ok(self)
    }

    /// Registers a `GET` handler.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidPath`] if `path` does not start with `/`.
    pub fn get<F, T, E>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&Context) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: std::fmt::Display,
    {
        self.add_route(Method::Get, path, Handler::new(handler))
    }

    /// Registers a `POST` handler that receives the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidPath`] if `path` does not start with `/`.
    pub fn post<F, T, E>(&mut self, path: &str, handler: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&Context, Value) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: std::fmt::Display,
    {
        self.add_route(Method::Post, path, Handler::with_body(handler))
    }

    /// Binds the listener and freezes the route table.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(BoundServer {
            listener,
            local_addr,
            max_request_size: self.config.max_request_size,
            dispatcher: Dispatcher::new(self.routes),
        })
    }

    /// Binds and serves until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        self.bind().await?.run().await
    }
}

/// A server with an open listener and a frozen route table.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_size: usize,
    dispatcher: Dispatcher,
}

impl BoundServer {
    /// Returns the address actually bound, useful when port `0` was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the process receives Ctrl+C.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())`; accept failures are logged and skipped.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "unable to listen for Ctrl+C, serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves until `shutdown` resolves, then stops accepting connections.
    ///
    /// Connections already accepted finish their in-flight request on their
    /// own tasks.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())`; accept failures are logged and skipped.
    pub async fn run_until<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        self.log_banner();
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                () = &mut shutdown => {
                    info!(address = %self.local_addr, "shutting down server");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(peer = %peer_addr, "connection accepted");
            let dispatcher = self.dispatcher.clone();
            let max_request_size = self.max_request_size;

            tokio::spawn(async move {
                if let Err(e) =
                    handle_connection(stream, peer_addr, dispatcher, max_request_size).await
                {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }

        Ok(())
    }

    fn log_banner(&self) {
        info!("Server running at http://{}", self.local_addr);
        info!("Registered routes:");
        for (method, path) in self.dispatcher.routes().routes() {
            info!("  {method:6} {path}");
        }
        info!("Press Ctrl+C to stop");
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// Requests already sitting in the buffer are served before reading again, so
/// pipelined requests are answered in order.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    dispatcher: Dispatcher,
    max_request_size: usize,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        match take_request(&mut buf, max_request_size) {
            Ok(Some(request)) => {
                let keep_alive = request.is_keep_alive();
                info!(
                    peer = %peer_addr,
                    method = %request.method(),
                    path = %request.path(),
                    "Received {} request: {}",
                    request.method(),
                    request.path()
                );

                let dispatcher = dispatcher.clone();
                let response = match tokio::task::spawn_blocking(move || {
                    dispatcher.dispatch(request, Some(peer_addr))
                })
                .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        error!(peer = %peer_addr, error = %e, "dispatch task failed");
                        error_response(
                            StatusCode::InternalServerError,
                            StatusCode::InternalServerError.canonical_reason(),
                        )
                    }
                };

                stream
                    .write_all(&response.keep_alive(keep_alive).into_bytes())
                    .await?;
                stream.flush().await?;

                if !keep_alive {
                    debug!(peer = %peer_addr, "Connection: close, shutting down");
                    break;
                }
                continue;
            }
            Ok(None) => {}
            Err((status, message)) => {
                warn!(peer = %peer_addr, %status, reason = %message, "rejecting request");
                let response = error_response(status, &message).keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                stream.flush().await?;
                break;
            }
        }

        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                debug!(peer = %peer_addr, "connection closed by peer");
            } else {
                debug!(peer = %peer_addr, pending = buf.len(), "peer closed mid-request");
            }
            break;
        }
    }

    Ok(())
}

/// Splits the next complete request (head plus `Content-Length` body) off `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, and the status and message
/// to answer with when the buffered bytes can never form an acceptable request.
fn take_request(
    buf: &mut BytesMut,
    max_request_size: usize,
) -> Result<Option<Request>, (StatusCode, String)> {
    if buf.is_empty() {
        return Ok(None);
    }

    let too_large = || {
        (
            StatusCode::PayloadTooLarge,
            "Request entity too large".to_owned(),
        )
    };

    let (request, body_offset) = match Request::parse(buf) {
        Ok(pair) => pair,
        Err(RequestError::Incomplete) if buf.len() > max_request_size => return Err(too_large()),
        Err(RequestError::Incomplete) => return Ok(None),
        Err(e) => return Err((StatusCode::BadRequest, format!("Bad Request: {e}"))),
    };

    let total = body_offset.saturating_add(request.content_length());
    if total > max_request_size {
        return Err(too_large());
    }
    if buf.len() < total {
        return Ok(None);
    }

    let raw = buf.split_to(total).freeze();
    Ok(Some(request.with_body(raw.slice(body_offset..))))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn take_request_waits_for_full_body() {
        let mut buf = BytesMut::from(&b"POST /echo HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"a\""[..]);
        assert!(take_request(&mut buf, 1024).unwrap().is_none());

        buf.extend_from_slice(b":1}");
        let request = take_request(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(&request.body()[..], b"{\"a\":1}");
        assert!(buf.is_empty());
    }

    #[test]
    fn take_request_leaves_pipelined_bytes() {
        let mut buf = BytesMut::from(
            &b"POST /echo HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}GET /hello HTTP/1.1\r\n\r\n"[..],
        );
        let first = take_request(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(first.path(), "/echo");
        assert_eq!(&first.body()[..], b"{}");

        let second = take_request(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(second.method(), &Method::Get);
        assert_eq!(second.path(), "/hello");
        assert!(second.body().is_empty());
        assert!(take_request(&mut buf, 1024).unwrap().is_none());
    }

    #[test]
    fn take_request_rejects_oversized() {
        let mut buf = BytesMut::from(&b"POST /echo HTTP/1.1\r\nContent-Length: 5000\r\n\r\n"[..]);
        let (status, _) = take_request(&mut buf, 1024).unwrap_err();
        assert_eq!(status, StatusCode::PayloadTooLarge);

        let mut buf = BytesMut::from(vec![b'a'; 2048].as_slice());
        buf[..4].copy_from_slice(b"GET ");
        let (status, _) = take_request(&mut buf, 1024).unwrap_err();
        assert_eq!(status, StatusCode::PayloadTooLarge);
    }

    #[test]
    fn take_request_rejects_malformed() {
        let mut buf = BytesMut::from(&b"GET /x HTTP/1.1\r\nContent-Length: nope\r\n\r\n"[..]);
        let (status, message) = take_request(&mut buf, 1024).unwrap_err();
        assert_eq!(status, StatusCode::BadRequest);
        assert!(message.starts_with("Bad Request: "));
    }

    #[test]
    fn take_request_rejects_non_utf8_framing_header() {
        let mut buf =
            BytesMut::from(&b"POST /echo HTTP/1.1\r\nContent-Length: \xff7\r\n\r\n{\"a\":1}"[..]);
        let (status, message) = take_request(&mut buf, 1024).unwrap_err();
        assert_eq!(status, StatusCode::BadRequest);
        assert!(message.contains("Content-Length"), "{message}");
    }

    #[test]
    fn registration_through_server() {
        let mut server = ApiServer::default();
        assert_eq!(server.config().bind_addr(), "0.0.0.0:8000");

        server
            .get("/hello", |_ctx: &Context| Ok::<_, String>(json!({"message": "hi"})))
            .unwrap()
            .post("/echo", |_ctx: &Context, data: Value| Ok::<_, String>(data))
            .unwrap();
        server
            .add_route("get", "/lower", Handler::new(|_ctx: &Context| Ok::<_, String>(1)))
            .unwrap();
        assert_eq!(server.routes().len(), 3);
        assert!(server.routes().lookup(&Method::Get, "/lower").is_some());

        let err = server
            .add_route("DELETE", "/hello", Handler::new(|_ctx: &Context| Ok::<_, String>(1)))
            .unwrap_err();
        assert_eq!(err, RouteError::UnsupportedMethod { method: "DELETE".into() });

        assert!(server.get("no-slash", |_ctx: &Context| Ok::<_, String>(1)).is_err());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = ApiServer::new("127.0.0.1", port).bind().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { ref addr, .. } if *addr == format!("127.0.0.1:{port}")));
    }
}
