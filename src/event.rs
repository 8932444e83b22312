//! Nostr event model.

use serde::{Deserialize, Serialize};

/// Kind of a plain text note.
pub const KIND_TEXT_NOTE: u32 = 1;
/// Kind of a NIP-18 repost.
pub const KIND_REPOST: u32 = 6;
/// Kind of a NIP-25 reaction.
pub const KIND_REACTION: u32 = 7;
/// Kind of a NIP-18 generic repost.
pub const KIND_GENERIC_REPOST: u32 = 16;

/// Simple tag wrapper preserving tag fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name, i.e. the first field. Empty tags have no name.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

/// Core Nostr event as handed over by the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Kind number, e.g. `1` or `30023`.
    pub kind: u32,
    /// Arbitrary tags.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature over the event hash.
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// First tag with the given name. Tag names are case-sensitive.
    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name() == Some(name))
    }

    /// Last tag with the given name. NIP-13 and NIP-25 both read the
    /// final occurrence.
    pub fn find_last_tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().rev().find(|t| t.name() == Some(name))
    }

    /// Whether any tag carries the given name.
    pub fn has_tag(&self, name: &str) -> bool {
        self.find_tag(name).is_some()
    }
}

/// Check that a string is a plausible hex-encoded x-only public key.
pub fn is_valid_public_key(pk: &str) -> bool {
    pk.len() == 64 && pk.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
