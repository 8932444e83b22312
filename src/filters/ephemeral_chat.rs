//! Anti-flood checks for ephemeral chat kinds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use crate::config::EphemeralChatConfig;
use crate::event::Event;
use crate::limiter::{TokenBucket, TtlCache};
use crate::nip;
use crate::policy::{Filter, Meta, Verdict};

const LAST_SEEN_TTL: Duration = Duration::from_secs(5 * 60);
const LIMITER_TTL: Duration = Duration::from_secs(15 * 60);

pub struct EphemeralChatFilter {
    cfg: EphemeralChatConfig,
    zalgo_regex: Option<Regex>,
    word_regex: Option<Regex>,
    last_seen: TtlCache<String, Instant>,
    limiters: TtlCache<String, Arc<TokenBucket>>,
}

impl EphemeralChatFilter {
    pub fn new(cfg: &EphemeralChatConfig) -> Result<Self> {
        let zalgo_regex = if cfg.block_zalgo_text {
            Some(Regex::new(r"\p{M}").expect("combining-mark class compiles"))
        } else {
            None
        };
        let word_regex = if cfg.max_word_length > 0 {
            Some(
                Regex::new(&format!(r"\S{{{},}}", cfg.max_word_length))
                    .context("invalid max_word_length generates bad regexp")?,
            )
        } else {
            None
        };

        let size = if cfg.cache_size == 0 { 10_000 } else { cfg.cache_size };
        Ok(Self {
            cfg: cfg.clone(),
            zalgo_regex,
            word_regex,
            last_seen: TtlCache::new(size, LAST_SEEN_TTL),
            limiters: TtlCache::new(size, LIMITER_TTL),
        })
    }

    fn limiter(&self, pubkey: &str) -> Arc<TokenBucket> {
        if let Some(limiter) = self.limiters.get(&pubkey.to_string()) {
            return limiter;
        }
        let limiter = Arc::new(TokenBucket::new(
            self.cfg.rate_limit_rate,
            self.cfg.rate_limit_burst,
        ));
        self.limiters.add(pubkey.to_string(), limiter.clone());
        limiter
    }
}

#[async_trait]
impl Filter for EphemeralChatFilter {
    fn name(&self) -> &'static str {
        "EphemeralChatFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        if !self.cfg.enabled || !self.cfg.kinds.contains(&event.kind) {
            return Verdict::accept("filter_disabled_or_kind_not_matched");
        }

        if !self.cfg.min_delay_between_messages.is_zero() {
            let now = Instant::now();
            if let Some(last) = self.last_seen.get(&event.pubkey) {
                let delay = now.duration_since(last);
                if delay < self.cfg.min_delay_between_messages {
                    return Verdict::reject(format!(
                        "posting_too_frequently:delay_{:.1}s,limit_{:.1}s",
                        delay.as_secs_f64(),
                        self.cfg.min_delay_between_messages.as_secs_f64()
                    ));
                }
            }
            self.last_seen.add(event.pubkey.clone(), now);
        }

        let content = &event.content;

        if self.cfg.max_caps_ratio > 0.0 {
            let mut letters = 0usize;
            let mut caps = 0usize;
            for c in content.chars() {
                if c.is_alphabetic() {
                    letters += 1;
                    if c.is_uppercase() {
                        caps += 1;
                    }
                }
            }
            if letters > self.cfg.min_letters_for_caps_check {
                let ratio = caps as f64 / letters as f64;
                if ratio > self.cfg.max_caps_ratio {
                    return Verdict::reject(format!(
                        "excessive_caps:ratio_{ratio:.2},limit_{:.2}",
                        self.cfg.max_caps_ratio
                    ));
                }
            }
        }

        if self.cfg.max_character_repetitions > 0 {
            let mut run = 1usize;
            let mut prev: Option<char> = None;
            for c in content.chars() {
                if prev == Some(c) {
                    run += 1;
                } else {
                    run = 1;
                }
                if run >= self.cfg.max_character_repetitions {
                    return Verdict::reject(format!(
                        "excessive_char_repetition:count_{run},limit_{}",
                        self.cfg.max_character_repetitions
                    ));
                }
                prev = Some(c);
            }
        }

        if let Some(word_regex) = &self.word_regex {
            if word_regex.is_match(content) {
                return Verdict::reject(format!(
                    "word_too_long:limit_{}",
                    self.cfg.max_word_length
                ));
            }
        }

        if let Some(zalgo_regex) = &self.zalgo_regex {
            if zalgo_regex.is_match(content) {
                return Verdict::reject("zalgo_text_detected");
            }
        }

        if self.limiter(&event.pubkey).allow() {
            return Verdict::accept("rate_limit_ok");
        }

        if nip::is_pow_valid(event, self.cfg.required_pow_on_limit) {
            return Verdict::accept("rate_limit_bypassed_by_pow");
        }

        Verdict::reject(format!(
            "rate_limit_exceeded:required_pow_{}",
            self.cfg.required_pow_on_limit
        ))
    }
}
