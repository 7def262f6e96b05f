//! # nanoserver
//!
//! A minimal JSON API server: register handlers by exact `(method, path)`,
//! get JSON bodies decoded on the way in and return values encoded on the
//! way out.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nanoserver::{ApiServer, Context};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = ApiServer::new("0.0.0.0", 8000);
//!     server.get("/hello", |_ctx: &Context| {
//!         Ok::<_, String>(json!({"message": "Hello World"}))
//!     })?;
//!     server.post("/echo", |_ctx: &Context, data: Value| {
//!         Ok::<_, String>(json!({"received": data}))
//!     })?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Responses
//!
//! | Situation                               | Status | Body                          |
//! |-----------------------------------------|--------|-------------------------------|
//! | handler returned `Ok(value)`            | 200    | `value` as JSON               |
//! | no route for `(method, path)`           | 404    | `{"error": "Not Found"}`      |
//! | `POST` body is not valid JSON           | 400    | `{"error": "Invalid JSON: …"}`|
//! | handler returned `Err(e)`               | 500    | `{"error": "<e>"}`            |
//! | handler panicked or value not encodable | 500    | `{"error": "…"}`              |
//!
//! An empty `POST` body is handed to the handler as `{}`.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod http;
pub mod json;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use context::Context;
pub use dispatch::{DispatchError, Dispatcher};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::{Handler, RouteError, RouteTable};
pub use server::{ApiServer, BoundServer, ServerError};
