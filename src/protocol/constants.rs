//! Protocol constants

/// Method every session-open request must carry
pub const CONNECT_METHOD: &str = "CONNECT";

/// Extended CONNECT protocol designator for WebTransport
pub const WEBTRANSPORT_PROTOCOL: &str = "webtransport";

/// ALPN identifier negotiated for HTTP/3
pub const H3_ALPN: &str = "h3";

/// Path prefix for publisher sessions
pub const PUBLISH_PREFIX: &str = "/publish/";

/// Path prefix for viewer sessions
pub const WATCH_PREFIX: &str = "/watch/";

/// Header sent with every accepted session
pub const DRAFT_HEADER: (&str, &str) = ("sec-webtransport-http3-draft", "draft02");

/// Session accepted
pub const STATUS_OK: u16 = 200;

/// Wrong method or protocol on session open
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Unknown path on session open
pub const STATUS_NOT_FOUND: u16 = 404;

/// Largest datagram frame the transport is asked to accept (64KB)
pub const DEFAULT_MAX_DATAGRAM_FRAME_SIZE: usize = 65536;

/// Default UDP port for the relay
pub const DEFAULT_PORT: u16 = 4433;
