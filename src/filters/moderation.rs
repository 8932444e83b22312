//! Reaction-driven moderator actions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::PolicyConfig;
use crate::event::{is_valid_public_key, Event, KIND_REACTION};
use crate::policy::{Filter, Meta, Verdict};
use crate::store::BanStore;
use crate::strfry::StrfryClient;

/// Bans or unbans the target of a moderator's reaction. Always accepts
/// the reaction itself; the verdict concerns the event, not the action.
pub struct ModerationFilter {
    moderator_pubkey: String,
    ban_emoji: String,
    unban_emoji: String,
    ban_duration: Duration,
    store: Arc<dyn BanStore>,
    strfry: Arc<dyn StrfryClient>,
}

impl ModerationFilter {
    pub fn new(cfg: &PolicyConfig, store: Arc<dyn BanStore>, strfry: Arc<dyn StrfryClient>) -> Self {
        if cfg.moderator_pubkey.is_empty() {
            warn!("policy.moderator_pubkey is not set, moderation filter will be inactive");
        }
        Self {
            moderator_pubkey: cfg.moderator_pubkey.clone(),
            ban_emoji: cfg.ban_emoji.clone(),
            unban_emoji: cfg.unban_emoji.clone(),
            ban_duration: cfg.ban_duration,
            store,
            strfry,
        }
    }
}

#[async_trait]
impl Filter for ModerationFilter {
    fn name(&self) -> &'static str {
        "ModerationFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        if self.moderator_pubkey.is_empty()
            || event.kind != KIND_REACTION
            || event.pubkey != self.moderator_pubkey
        {
            return Verdict::accept("not_a_moderation_event");
        }

        let Some(p_tag) = event.find_last_tag("p") else {
            return Verdict::accept("no_pubkey_tag_in_reaction");
        };
        if p_tag.0.len() < 2 {
            return Verdict::accept("no_pubkey_tag_in_reaction");
        }
        let target = p_tag.0[1].clone();
        if !is_valid_public_key(&target) || target == self.moderator_pubkey {
            return Verdict::accept("invalid_target_pubkey");
        }

        if event.content == self.ban_emoji {
            info!(banned_pubkey = %target, "moderator action: banning pubkey");
            if let Err(source) = self.store.ban_author(&target, self.ban_duration).await {
                return Verdict::Error {
                    reason: "internal_moderation_ban_failed",
                    source,
                };
            }
            let strfry = self.strfry.clone();
            tokio::spawn(async move {
                if let Err(err) = strfry.delete_events_by_author(&target).await {
                    error!(pubkey = %target, error = %err, "failed to delete events after moderator ban");
                }
            });
            return Verdict::accept("moderator_ban_executed");
        }

        if event.content == self.unban_emoji {
            info!(unbanned_pubkey = %target, "moderator action: unbanning pubkey");
            if let Err(source) = self.store.unban_author(&target).await {
                return Verdict::Error {
                    reason: "internal_moderation_unban_failed",
                    source,
                };
            }
            return Verdict::accept("moderator_unban_executed");
        }

        Verdict::accept("emoji_not_matched")
    }
}
