//! The filter stages that make up the policy pipeline.

pub mod autoban;
pub mod banned_author;
pub mod emergency;
pub mod ephemeral_chat;
pub mod freshness;
pub mod keyword;
pub mod kind;
pub mod language;
pub mod moderation;
pub mod rate_limiter;
pub mod repost_abuse;
pub mod size;
pub mod tags;

#[cfg(test)]
pub(crate) mod testutil {
    use crate::event::{Event, Tag};

    /// Minimal event for filter tests; fields beyond the ones under
    /// test carry fixed plausible values.
    pub fn event(kind: u32, pubkey: &str, content: &str) -> Event {
        Event {
            id: "11".repeat(32),
            pubkey: pubkey.to_string(),
            created_at: now(),
            kind,
            tags: vec![],
            content: content.to_string(),
            sig: String::new(),
        }
    }

    pub fn event_with_tags(kind: u32, pubkey: &str, content: &str, tags: Vec<Tag>) -> Event {
        Event {
            tags,
            ..event(kind, pubkey, content)
        }
    }

    pub fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }
}
