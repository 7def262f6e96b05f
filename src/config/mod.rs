//! Construction-time server settings.

use serde::Deserialize;

/// Default bind address: all IPv4 interfaces.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8000;

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Where to listen and how much to buffer per request.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use nanoserver::ServerConfig;
///
/// let config: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
/// assert_eq!(config.host, "0.0.0.0");
/// assert_eq!(config.bind_addr(), "0.0.0.0:9000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Requests whose head plus body exceed this many bytes get `413`.
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }

    /// `host:port`, bracketing bare IPv6 hosts.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_request_size, 8 * 1024 * 1024);
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
    }

    #[test]
    fn builder_overrides() {
        let config = ServerConfig::default()
            .host("127.0.0.1")
            .port(0)
            .max_request_size(1024);
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
        assert_eq!(config.max_request_size, 1024);
        assert_eq!(ServerConfig::new("localhost", 9090).bind_addr(), "localhost:9090");
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        assert_eq!(ServerConfig::new("::1", 80).bind_addr(), "[::1]:80");
        assert_eq!(ServerConfig::new("[::1]", 80).bind_addr(), "[::1]:80");
    }

    #[test]
    fn deserialize_full_and_unknown() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"host": "127.0.0.1", "port": 3000, "max_request_size": 4096}"#,
        )
        .unwrap();
        assert_eq!(config, ServerConfig::new("127.0.0.1", 3000).max_request_size(4096));

        assert!(serde_json::from_str::<ServerConfig>(r#"{"prot": 1}"#).is_err());
    }
}
