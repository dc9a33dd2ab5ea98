//! Request path routing
//!
//! A session-open request names its role and channel in the path:
//! `/publish/{channel}` or `/watch/{channel}`. Everything after the prefix is
//! the channel name, taken verbatim.

use super::constants::{PUBLISH_PREFIX, WATCH_PREFIX};

/// Role a session plays on its channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Sends datagrams into the channel
    Publisher,
    /// Receives datagrams from the channel
    Viewer,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRole::Publisher => write!(f, "publisher"),
            SessionRole::Viewer => write!(f, "viewer"),
        }
    }
}

/// A parsed session route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub role: SessionRole,
    pub channel: String,
}

impl Route {
    /// Parse a request path
    ///
    /// Returns `None` for paths matching neither prefix.
    pub fn parse(path: &str) -> Option<Self> {
        if let Some(channel) = path.strip_prefix(PUBLISH_PREFIX) {
            Some(Self::publish(channel))
        } else {
            path.strip_prefix(WATCH_PREFIX).map(Self::watch)
        }
    }

    /// Route for publishing to `channel`
    pub fn publish(channel: impl Into<String>) -> Self {
        Self {
            role: SessionRole::Publisher,
            channel: channel.into(),
        }
    }

    /// Route for watching `channel`
    pub fn watch(channel: impl Into<String>) -> Self {
        Self {
            role: SessionRole::Viewer,
            channel: channel.into(),
        }
    }

    /// Render back into a request path
    pub fn path(&self) -> String {
        match self.role {
            SessionRole::Publisher => format!("{}{}", PUBLISH_PREFIX, self.channel),
            SessionRole::Viewer => format!("{}{}", WATCH_PREFIX, self.channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_publish() {
        let route = Route::parse("/publish/s1").unwrap();
        assert_eq!(route.role, SessionRole::Publisher);
        assert_eq!(route.channel, "s1");
    }

    #[test]
    fn test_parse_watch() {
        let route = Route::parse("/watch/s1").unwrap();
        assert_eq!(route.role, SessionRole::Viewer);
        assert_eq!(route.channel, "s1");
    }

    #[test]
    fn test_channel_name_taken_verbatim() {
        // No charset validation, case preserved, nested segments kept
        let route = Route::parse("/watch/Room-A/cam 2?x=1").unwrap();
        assert_eq!(route.channel, "Room-A/cam 2?x=1");

        let route = Route::parse("/publish/").unwrap();
        assert_eq!(route.channel, "");
    }

    #[test]
    fn test_unknown_paths() {
        assert!(Route::parse("/").is_none());
        assert!(Route::parse("/publish").is_none());
        assert!(Route::parse("/watching/s1").is_none());
        assert!(Route::parse("publish/s1").is_none());
        assert!(Route::parse("/PUBLISH/s1").is_none());
    }

    #[test]
    fn test_path_roundtrip() {
        assert_eq!(Route::publish("s1").path(), "/publish/s1");
        assert_eq!(Route::watch("s1").path(), "/watch/s1");
    }
}
