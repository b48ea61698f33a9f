//! Account-namespaced feed topics
//!
//! The broker files every feed under the account's username, so a user-facing
//! topic such as `feeds/sensorfeed` is published as
//! `<username>/feeds/sensorfeed`.

use std::fmt;

/// A topic prefixed with the account namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedTopic(String);

impl FeedTopic {
    /// Join `username` and `topic` with exactly one `/`, leaving both untouched
    pub fn new(username: &str, topic: &str) -> Self {
        Self(format!("{username}/{topic}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn feed_topic_is_username_slash_topic(username in ".*", topic in ".*") {
            let full = FeedTopic::new(&username, &topic);
            prop_assert_eq!(full.as_str(), format!("{}/{}", username, topic));
        }

        #[test]
        fn feed_topic_keeps_the_username_prefix(username in "[a-z0-9_]{1,16}", topic in ".*") {
            let full = FeedTopic::new(&username, &topic);
            let prefix = format!("{}/", username);
            prop_assert!(full.as_str().starts_with(&prefix));
        }
    }

    #[test]
    fn test_adafruit_feed_topic() {
        assert_eq!(
            FeedTopic::new("pg42819", "feeds/sensorfeed").to_string(),
            "pg42819/feeds/sensorfeed"
        );
    }

    #[test]
    fn test_no_normalisation() {
        assert_eq!(FeedTopic::new("me", "/feeds/x/").as_str(), "me//feeds/x/");
        assert_eq!(FeedTopic::new("", "").as_str(), "/");
    }
}
