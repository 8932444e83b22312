//! Predictive repost-ratio accounting per author.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::RepostAbuseConfig;
use crate::event::{Event, KIND_GENERIC_REPOST, KIND_REPOST, KIND_TEXT_NOTE};
use crate::limiter::TtlCache;
use crate::policy::{Filter, Meta, Verdict};

const STATS_CACHE_SIZE: usize = 50_000;

static NIP21_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(naddr1|nevent1|note1)[0-9a-z]+\b").unwrap());

#[derive(Clone, Copy, Default)]
struct ActivityStats {
    original_posts: u32,
    reposts: u32,
    last_event_time: Option<Instant>,
}

impl ActivityStats {
    /// Zero the counters when the author has been quiet long enough.
    fn soft_reset(&mut self, cfg: &RepostAbuseConfig) {
        if cfg.reset_duration.is_zero() {
            return;
        }
        if let Some(last) = self.last_event_time {
            if last.elapsed() > cfg.reset_duration {
                self.original_posts = 0;
                self.reposts = 0;
            }
        }
    }
}

pub struct RepostAbuseFilter {
    cfg: RepostAbuseConfig,
    stats: TtlCache<String, ActivityStats>,
    // Guards read-modify-write sequences on `stats`; classification and
    // the ratio decision deliberately happen outside it.
    mu: Mutex<()>,
}

impl RepostAbuseFilter {
    pub fn new(cfg: &RepostAbuseConfig) -> Self {
        let mut cfg = cfg.clone();
        cfg.max_ratio = cfg.max_ratio.clamp(0.0, 1.0);
        Self {
            stats: TtlCache::new(STATS_CACHE_SIZE, cfg.cache_ttl),
            cfg,
            mu: Mutex::new(()),
        }
    }

    /// NIP-18 classification: kind 6 and kind 16 are reposts, as is a
    /// text note quoting via a `q` tag.
    fn classify_repost(&self, event: &Event) -> Option<&'static str> {
        match event.kind {
            KIND_REPOST => Some("kind6"),
            KIND_GENERIC_REPOST => Some("kind16"),
            KIND_TEXT_NOTE => {
                let has_q = event
                    .tags
                    .iter()
                    .any(|t| t.name().is_some_and(|n| n.eq_ignore_ascii_case("q")));
                if has_q
                    && (!self.cfg.require_nip21_in_quote || NIP21_RE.is_match(&event.content))
                {
                    Some("quote1")
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Filter for RepostAbuseFilter {
    fn name(&self) -> &'static str {
        "RepostAbuseFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        if !self.cfg.enabled {
            return Verdict::accept("filter_disabled");
        }
        if !matches!(
            event.kind,
            KIND_TEXT_NOTE | KIND_REPOST | KIND_GENERIC_REPOST
        ) {
            return Verdict::accept("kind_not_checked");
        }

        // Step 1: snapshot under a narrow lock, soft-resetting first.
        let snapshot = {
            let _guard = self.mu.lock().unwrap();
            let mut stats = self.stats.get(&event.pubkey).unwrap_or_default();
            stats.soft_reset(&self.cfg);
            stats
        };

        let is_repost = self.classify_repost(event).is_some();

        // Step 2: predictive decision on the snapshot, no lock held.
        let mut rejection = None;
        if is_repost {
            let total = snapshot.original_posts + snapshot.reposts;
            if total >= self.cfg.min_events {
                let predicted =
                    f64::from(snapshot.reposts + 1) / f64::from(total + 1);
                if predicted >= self.cfg.max_ratio {
                    rejection = Some(format!(
                        "repost_ratio_too_high:would_be_{:.1}%,limit_is_{:.1}%",
                        predicted * 100.0,
                        self.cfg.max_ratio * 100.0
                    ));
                }
            }
        }

        // Step 3: commit under the lock, re-reading to tolerate a
        // concurrent update between the two critical sections.
        {
            let _guard = self.mu.lock().unwrap();
            let mut fresh = self.stats.get(&event.pubkey).unwrap_or_default();
            fresh.soft_reset(&self.cfg);

            if rejection.is_none() || self.cfg.count_reject_as_activity {
                fresh.last_event_time = Some(Instant::now());
            }
            if rejection.is_none() {
                if is_repost {
                    fresh.reposts += 1;
                } else {
                    fresh.original_posts += 1;
                }
            }
            self.stats.add(event.pubkey.clone(), fresh);
        }

        match rejection {
            Some(reason) => Verdict::reject(reason),
            None => Verdict::accept("repost_ratio_ok"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tag;
    use crate::filters::testutil::{event, event_with_tags};
    use std::time::Duration;

    fn config(max_ratio: f64, min_events: u32) -> RepostAbuseConfig {
        RepostAbuseConfig {
            enabled: true,
            max_ratio,
            min_events,
            reset_duration: Duration::ZERO,
            cache_ttl: Duration::from_secs(3600),
            count_reject_as_activity: false,
            require_nip21_in_quote: false,
        }
    }

    async fn run(f: &RepostAbuseFilter, ev: &Event) -> Verdict {
        let mut meta = Meta::new();
        f.matches(ev, &mut meta).await
    }

    #[tokio::test]
    async fn ratio_enforced_after_min_events() {
        let f = RepostAbuseFilter::new(&config(0.5, 4));
        let bob = "b0".repeat(32);

        // Four originals build history.
        for _ in 0..4 {
            assert!(run(&f, &event(KIND_TEXT_NOTE, &bob, "post")).await.is_accept());
        }
        // Ratios 1/5, 2/6, 3/7 stay under 0.5.
        assert!(run(&f, &event(KIND_REPOST, &bob, "")).await.is_accept());
        assert!(run(&f, &event(KIND_GENERIC_REPOST, &bob, "")).await.is_accept());
        assert!(run(&f, &event(KIND_REPOST, &bob, "")).await.is_accept());
        // 4/8 = 0.5 >= 0.5.
        let v = run(&f, &event(KIND_GENERIC_REPOST, &bob, "")).await;
        assert!(matches!(v, Verdict::Reject(r) if r.starts_with("repost_ratio_too_high:")));
    }

    #[tokio::test]
    async fn below_min_events_reposts_flow_freely() {
        let f = RepostAbuseFilter::new(&config(0.1, 10));
        let pk = "aa".repeat(32);
        for _ in 0..9 {
            assert!(run(&f, &event(KIND_REPOST, &pk, "")).await.is_accept());
        }
    }

    #[tokio::test]
    async fn rejected_repost_does_not_count_as_activity() {
        let f = RepostAbuseFilter::new(&config(0.5, 1));
        let pk = "aa".repeat(32);

        assert!(run(&f, &event(KIND_REPOST, &pk, "")).await.is_accept());
        // 2/2 = 1.0 rejected; counters unchanged.
        assert!(!run(&f, &event(KIND_REPOST, &pk, "")).await.is_accept());
        // An original still goes through and is counted.
        assert!(run(&f, &event(KIND_TEXT_NOTE, &pk, "post")).await.is_accept());
    }

    #[tokio::test]
    async fn quote_notes_classify_as_reposts() {
        let f = RepostAbuseFilter::new(&config(0.5, 0));
        let pk = "aa".repeat(32);

        let quote = event_with_tags(
            KIND_TEXT_NOTE,
            &pk,
            "look at this",
            vec![Tag(vec!["q".into(), "11".repeat(32)])],
        );
        // min_events 0: first repost is already 1/1 = 1.0 >= 0.5.
        assert!(!run(&f, &quote).await.is_accept());
    }

    #[tokio::test]
    async fn quote_requires_nip21_reference_when_configured() {
        let mut cfg = config(0.5, 0);
        cfg.require_nip21_in_quote = true;
        let f = RepostAbuseFilter::new(&cfg);
        let pk = "aa".repeat(32);
        let q_tag = vec![Tag(vec!["q".into(), "11".repeat(32)])];

        // Without a nostr reference in content it counts as an original.
        let bare = event_with_tags(KIND_TEXT_NOTE, &pk, "just text", q_tag.clone());
        assert!(run(&f, &bare).await.is_accept());

        let with_ref = event_with_tags(
            KIND_TEXT_NOTE,
            &pk,
            "see nostr:note1qqqsxu2kya0pl8gy82s2l0h9hx9837kmsmn4c48ee3r2pax",
            q_tag,
        );
        assert!(!run(&f, &with_ref).await.is_accept());
    }

    #[tokio::test]
    async fn inactivity_soft_resets_counters() {
        let mut cfg = config(0.5, 1);
        cfg.reset_duration = Duration::from_millis(50);
        let f = RepostAbuseFilter::new(&cfg);
        let pk = "aa".repeat(32);

        assert!(run(&f, &event(KIND_REPOST, &pk, "")).await.is_accept());
        tokio::time::sleep(Duration::from_millis(80)).await;
        // History is stale: counters reset, total 0 < min_events 1.
        assert!(run(&f, &event(KIND_REPOST, &pk, "")).await.is_accept());
    }

    #[tokio::test]
    async fn unrelated_kinds_skip_accounting() {
        let f = RepostAbuseFilter::new(&config(0.0, 0));
        let v = run(&f, &event(7, &"aa".repeat(32), "+")).await;
        assert!(matches!(v, Verdict::Accept(r) if r == "kind_not_checked"));
    }
}
