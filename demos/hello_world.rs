//! Serves `GET /hello` and `POST /echo` on port 8000.
//!
//! ```text
//! cargo run --example hello_world
//! curl localhost:8000/hello
//! curl -d '{"test":"data"}' localhost:8000/echo
//! ```

use nanoserver::{ApiServer, Context, ServerConfig};
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn hello(_ctx: &Context) -> Result<Value, String> {
    Ok(json!({"message": "Hello World"}))
}

fn echo(_ctx: &Context, data: Value) -> Result<Value, String> {
    Ok(json!({"received": data}))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "nanoserver=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut server = ApiServer::with_config(ServerConfig::default());
    server.get("/hello", hello)?.post("/echo", echo)?;
    server.run().await?;
    Ok(())
}
