//! Session-open protocol handling
//!
//! This module provides:
//! - Constants for the WebTransport CONNECT handshake (method, protocol,
//!   status codes, accept headers)
//! - Path routing for `/publish/{channel}` and `/watch/{channel}`

pub mod constants;
pub mod route;

pub use route::{Route, SessionRole};
