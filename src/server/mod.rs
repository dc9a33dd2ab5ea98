//! Relay server plumbing
//!
//! Everything between the transport adapter and the sessions: configuration,
//! credential loading, the per-connection event router and the server that
//! ties them together.

pub mod config;
pub mod credentials;
pub mod event;
pub mod listener;
pub mod router;
pub mod transport;

pub use config::ServerConfig;
pub use credentials::Credentials;
pub use event::{SessionRequest, TransportEvent};
pub use listener::{ConnectionHandle, RelayServer};
pub use router::{ConnectionPhase, SessionRouter};
pub use transport::{Transport, TransportSink};
