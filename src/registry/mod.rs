//! Channel registry for pub/sub routing
//!
//! The registry tracks every live channel and the sessions bound to it, and
//! fans datagrams out from a channel's publisher to its viewers.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ChannelRegistry>
//!                   ┌───────────────────────────┐
//!                   │ channels: HashMap<String, │
//!                   │   Arc<Channel {           │
//!                   │     publisher: Option<Id>,│
//!                   │     viewers: Id → Weak,   │
//!                   │   }>                      │
//!                   │ >                         │
//!                   └─────────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]              [Viewer]                [Viewer]
//!    relay()                  deliver()               deliver()
//!         │                       ▲                       ▲
//!         └──► Channel::broadcast()──────join_all─────────┘
//! ```
//!
//! # Locking
//!
//! The registry map lock is only held across map operations and O(1) slot
//! updates, always taken before a channel's own lock. Broadcasting takes a
//! snapshot of the viewer set and releases every lock before sending.
//!
//! # Zero-Copy Design
//!
//! Payloads are `bytes::Bytes`, so every viewer's copy shares the publisher's
//! allocation.

pub mod broadcast;
pub mod channel;
pub mod error;
pub mod store;

pub use broadcast::{BroadcastReport, DeliveryOutcome, RelayOutcome};
pub use channel::Channel;
pub use error::RegistryError;
pub use store::{ChannelRegistry, PublisherClaim};
