//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::protocol::constants::*;

/// Default certificate path, relative to the working directory
pub const DEFAULT_CERT_PATH: &str = "cert.crt";

/// Default private key path, relative to the working directory
pub const DEFAULT_KEY_PATH: &str = "key.key";

/// Default capacity of each connection's event queue
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the transport adapter should bind to
    pub bind_addr: SocketAddr,

    /// PEM certificate presented during the TLS handshake
    pub cert_path: PathBuf,

    /// PEM private key for `cert_path`
    pub key_path: PathBuf,

    /// Largest datagram frame the transport should accept
    ///
    /// Advertised by the transport adapter; every connection router also
    /// drops publisher payloads above it instead of relaying them.
    pub max_datagram_frame_size: usize,

    /// Events buffered per connection before the transport is back-pressured
    pub event_queue_capacity: usize,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            max_datagram_frame_size: DEFAULT_MAX_DATAGRAM_FRAME_SIZE,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            max_connections: 0, // Unlimited
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the certificate and private key paths
    pub fn credentials(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.cert_path = cert.into();
        self.key_path = key.into();
        self
    }

    /// Set the largest accepted datagram frame
    pub fn max_datagram_frame_size(mut self, size: usize) -> Self {
        self.max_datagram_frame_size = size;
        self
    }

    /// Set the per-connection event queue capacity (at least 1)
    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity.max(1);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert!(config.bind_addr.ip().is_loopback());
        assert_eq!(config.cert_path, PathBuf::from("cert.crt"));
        assert_eq!(config.key_path, PathBuf::from("key.key"));
        assert_eq!(config.max_datagram_frame_size, 65536);
        assert_eq!(config.event_queue_capacity, DEFAULT_EVENT_QUEUE_CAPACITY);
        assert_eq!(config.max_connections, 0);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "0.0.0.0:4434".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 4434);
        assert_eq!(config.cert_path, PathBuf::from(DEFAULT_CERT_PATH));
    }

    #[test]
    fn test_builder_credentials() {
        let config = ServerConfig::default().credentials("/etc/relay/a.crt", "/etc/relay/a.key");

        assert_eq!(config.cert_path, PathBuf::from("/etc/relay/a.crt"));
        assert_eq!(config.key_path, PathBuf::from("/etc/relay/a.key"));
    }

    #[test]
    fn test_builder_event_queue_capacity_floor() {
        // A zero-capacity mpsc channel would panic
        let config = ServerConfig::default().event_queue_capacity(0);

        assert_eq!(config.event_queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_datagram_frame_size(1200)
            .event_queue_capacity(64)
            .max_connections(50);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_datagram_frame_size, 1200);
        assert_eq!(config.event_queue_capacity, 64);
        assert_eq!(config.max_connections, 50);
    }
}
