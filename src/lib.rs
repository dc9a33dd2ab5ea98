//! Publish/subscribe datagram relay for WebTransport sessions
//!
//! One publisher per named channel feeds unreliable datagrams which are fanned
//! out to every viewer watching the same channel. Payloads are opaque: the
//! relay never parses, reassembles or buffers them, so a viewer only sees
//! datagrams published after it joined.
//!
//! # Architecture
//!
//! ```text
//!   transport events ──► SessionRouter (one per connection)
//!                            │ /publish/{channel}        │ /watch/{channel}
//!                            ▼                           ▼
//!                     PublisherSession              ViewerSession
//!                            │ relay()                   ▲ deliver()
//!                            ▼                           │
//!                     Arc<ChannelRegistry> ──► Channel::broadcast()
//!                                                        │
//!                                                        ▼
//!                                               DatagramSink ──► transport
//! ```
//!
//! The QUIC/HTTP3 transport itself is not part of this crate. An adapter
//! implements [`server::Transport`] for each connection and feeds
//! [`server::TransportEvent`]s into the channel returned by
//! [`RelayServer::open_connection`].

pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use registry::{Channel, ChannelRegistry};
pub use server::{RelayServer, ServerConfig};
pub use session::{PublisherSession, SessionId, SessionKey, ViewerSession};
