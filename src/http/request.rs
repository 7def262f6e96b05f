//! HTTP/1.1 request parsing using the [`httparse`] crate.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

/// Headers that decide where this request ends and the next one begins.
const FRAMING_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Errors that can occur while parsing an HTTP/1.1 request head.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid Content-Length header: {value:?}")]
    InvalidContentLength { value: String },

    #[error("header {name} is not valid UTF-8")]
    NonUtf8Header { name: String },
}

/// A parsed HTTP/1.1 request.
///
/// [`Request::parse`] reads the request head only; the transport attaches the
/// body with [`Request::with_body`] once `Content-Length` bytes have arrived.
///
/// The path is the request target exactly as sent, query string included.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use nanoserver::http::{Method, Request};
///
/// let raw = b"POST /echo?verbose=1 HTTP/1.1\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
/// let (request, offset) = Request::parse(raw).unwrap();
/// let request = request.with_body(Bytes::copy_from_slice(&raw[offset..]));
///
/// assert_eq!(request.method(), &Method::Post);
/// assert_eq!(request.path(), "/echo?verbose=1");
/// assert_eq!(&request.body()[..], b"{\"a\":1}");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    content_length: usize,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parses a request head from `buf`.
    ///
    /// Returns the request (with an empty body) and the byte offset at which
    /// the body begins, i.e. immediately after the `\r\n\r\n` terminator.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: the head has not been fully received.
    /// - [`RequestError::Parse`]: the head is malformed.
    /// - [`RequestError::MissingField`]: method, path or version is absent.
    /// - [`RequestError::InvalidContentLength`]: `Content-Length` is not a number.
    /// - [`RequestError::NonUtf8Header`]: a framing header is not valid UTF-8.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = Method::from_token(
            raw_req
                .method
                .ok_or(RequestError::MissingField { field: "method" })?,
        );

        let path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            match std::str::from_utf8(header.value) {
                Ok(value) => header_map.insert(header.name, value),
                Err(_) if FRAMING_HEADERS
                    .iter()
                    .any(|h| header.name.eq_ignore_ascii_case(h)) =>
                {
                    return Err(RequestError::NonUtf8Header {
                        name: header.name.to_owned(),
                    });
                }
                // Opaque non-UTF-8 values cannot be exposed through `Headers`.
                Err(_) => {}
            }
        }

        let content_length = match header_map.get("content-length") {
            None => 0,
            Some(value) => {
                header_map
                    .content_length()
                    .ok_or_else(|| RequestError::InvalidContentLength {
                        value: value.to_owned(),
                    })?
            }
        };

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                content_length,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target as sent, including any query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Number of body bytes announced by `Content-Length` (0 when absent).
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should stay open after this request.
    ///
    /// `Connection` is a comma-separated token list. A `close` token wins,
    /// then `keep-alive`; otherwise HTTP/1.1 stays open and HTTP/1.0 closes.
    pub fn is_keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.headers
                .get_all("connection")
                .flat_map(|value| value.split(','))
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        };

        if has_token("close") {
            false
        } else if has_token("keep-alive") {
            true
        } else {
            self.version == 1
        }
    }
}
