//! Per-rule, per-subject token-bucket rate limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{RateBy, RateLimiterConfig};
use crate::event::Event;
use crate::limiter::{TokenBucket, TtlCache};
use crate::policy::{Filter, Meta, Verdict, META_REMOTE_IP};

#[derive(Clone)]
struct RuleParams {
    /// Stable within one process lifetime: `rule-<index>` or `default`.
    id: Arc<str>,
    description: Arc<str>,
    rate: f64,
    burst: u32,
}

pub struct RateLimiterFilter {
    enabled: bool,
    by: Option<RateBy>,
    default_rule: RuleParams,
    rules_by_kind: HashMap<u32, RuleParams>,
    buckets: TtlCache<String, Arc<TokenBucket>>,
}

impl RateLimiterFilter {
    pub fn new(cfg: &RateLimiterConfig) -> Self {
        let size = if cfg.cache_size == 0 { 65536 } else { cfg.cache_size };
        let ttl = if cfg.ttl.is_zero() {
            Duration::from_secs(600)
        } else {
            cfg.ttl
        };

        // The first rule mentioning a kind claims it.
        let mut rules_by_kind = HashMap::new();
        for (i, rule) in cfg.rules.iter().enumerate() {
            let params = RuleParams {
                id: format!("rule-{i}").into(),
                description: rule.description.as_str().into(),
                rate: rule.rate,
                burst: rule.burst,
            };
            for kind in &rule.kinds {
                rules_by_kind
                    .entry(*kind)
                    .or_insert_with(|| params.clone());
            }
        }

        Self {
            enabled: cfg.enabled,
            by: cfg.by,
            default_rule: RuleParams {
                id: "default".into(),
                description: "default".into(),
                rate: cfg.default_rate,
                burst: cfg.default_burst,
            },
            rules_by_kind,
            buckets: TtlCache::new(size, ttl),
        }
    }

    fn bucket(&self, key: String, rate: f64, burst: u32) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(&key) {
            return bucket;
        }
        let bucket = Arc::new(TokenBucket::new(rate, burst));
        self.buckets.add(key, bucket.clone());
        bucket
    }
}

#[async_trait]
impl Filter for RateLimiterFilter {
    fn name(&self) -> &'static str {
        "RateLimiterFilter"
    }

    async fn matches(&self, event: &Event, meta: &mut Meta) -> Verdict {
        if !self.enabled {
            return Verdict::accept("filter_disabled");
        }

        let rule = self
            .rules_by_kind
            .get(&event.kind)
            .unwrap_or(&self.default_rule);
        if rule.rate <= 0.0 {
            return Verdict::accept("rate_unlimited_for_kind");
        }

        let remote_ip = meta.get(META_REMOTE_IP).map(String::as_str).unwrap_or("");
        let mut subjects: Vec<String> = Vec::with_capacity(2);
        match self.by {
            Some(RateBy::Ip) => {
                if !remote_ip.is_empty() {
                    subjects.push(format!("ip:{remote_ip}"));
                }
            }
            Some(RateBy::Pubkey) => {
                if !event.pubkey.is_empty() {
                    subjects.push(format!("pk:{}", event.pubkey));
                }
            }
            Some(RateBy::Both) => {
                if !remote_ip.is_empty() {
                    subjects.push(format!("ip:{remote_ip}"));
                }
                if !event.pubkey.is_empty() {
                    subjects.push(format!("pk:{}", event.pubkey));
                }
            }
            None => {}
        }

        for subject in subjects {
            let key = format!("{}:{subject}", rule.id);
            let bucket = self.bucket(key, rule.rate, rule.burst);
            if !bucket.allow() {
                return Verdict::reject(format!(
                    "rate_limit_exceeded:rule:'{}'",
                    rule.description
                ));
            }
        }
        Verdict::accept("rate_limit_ok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitRule;
    use crate::filters::testutil::event;

    fn config(by: RateBy, rate: f64, burst: u32, rules: Vec<RateLimitRule>) -> RateLimiterConfig {
        RateLimiterConfig {
            enabled: true,
            by: Some(by),
            default_rate: rate,
            default_burst: burst,
            rules,
            ..RateLimiterConfig::default()
        }
    }

    async fn run(f: &RateLimiterFilter, ev: &Event, ip: &str) -> Verdict {
        let mut meta = Meta::new();
        meta.insert(META_REMOTE_IP.to_string(), ip.to_string());
        f.matches(ev, &mut meta).await
    }

    #[tokio::test]
    async fn by_ip_limits_second_event_from_same_address() {
        let f = RateLimiterFilter::new(&config(RateBy::Ip, 10.0, 1, vec![]));

        assert!(run(&f, &event(1, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        let v = run(&f, &event(1, &"bb".repeat(32), ""), "1.1.1.1").await;
        assert!(matches!(v, Verdict::Reject(r) if r == "rate_limit_exceeded:rule:'default'"));
        // A different address has its own bucket.
        assert!(run(&f, &event(1, &"cc".repeat(32), ""), "2.2.2.2").await.is_accept());
    }

    #[tokio::test]
    async fn by_pubkey_limits_across_addresses() {
        let f = RateLimiterFilter::new(&config(RateBy::Pubkey, 10.0, 1, vec![]));
        let pk = "aa".repeat(32);

        assert!(run(&f, &event(1, &pk, ""), "1.1.1.1").await.is_accept());
        assert!(!run(&f, &event(1, &pk, ""), "9.9.9.9").await.is_accept());
    }

    #[tokio::test]
    async fn kind_rule_overrides_default_and_keeps_own_buckets() {
        let rules = vec![RateLimitRule {
            description: "chat".into(),
            kinds: vec![42],
            rate: 10.0,
            burst: 2,
        }];
        let f = RateLimiterFilter::new(&config(RateBy::Ip, 10.0, 1, rules));

        // Default bucket (burst 1) exhausted by the first kind-1 event.
        assert!(run(&f, &event(1, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        assert!(!run(&f, &event(1, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());

        // Kind 42 runs under its own rule id with burst 2.
        assert!(run(&f, &event(42, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        assert!(run(&f, &event(42, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        let v = run(&f, &event(42, &"aa".repeat(32), ""), "1.1.1.1").await;
        assert!(matches!(v, Verdict::Reject(r) if r == "rate_limit_exceeded:rule:'chat'"));
    }

    #[tokio::test]
    async fn first_rule_mentioning_a_kind_wins() {
        let rules = vec![
            RateLimitRule {
                description: "strict chat".into(),
                kinds: vec![42],
                rate: 10.0,
                burst: 1,
            },
            RateLimitRule {
                description: "lenient chat".into(),
                kinds: vec![42, 23],
                rate: 10.0,
                burst: 5,
            },
        ];
        let f = RateLimiterFilter::new(&config(RateBy::Ip, 10.0, 10, rules));

        // Kind 42 runs under rule 0: burst 1, and the rejection names it.
        assert!(run(&f, &event(42, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        let v = run(&f, &event(42, &"aa".repeat(32), ""), "1.1.1.1").await;
        assert!(matches!(v, Verdict::Reject(r) if r == "rate_limit_exceeded:rule:'strict chat'"));

        // Kind 23 is only in rule 1 and keeps its burst of 5.
        for _ in 0..5 {
            assert!(run(&f, &event(23, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        }
        let v = run(&f, &event(23, &"aa".repeat(32), ""), "1.1.1.1").await;
        assert!(matches!(v, Verdict::Reject(r) if r == "rate_limit_exceeded:rule:'lenient chat'"));
    }

    #[tokio::test]
    async fn zero_rate_rule_is_unlimited() {
        let rules = vec![RateLimitRule {
            description: "firehose".into(),
            kinds: vec![20000],
            rate: 0.0,
            burst: 1,
        }];
        let f = RateLimiterFilter::new(&config(RateBy::Ip, 10.0, 1, rules));
        for _ in 0..20 {
            assert!(run(&f, &event(20000, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        }
    }

    #[tokio::test]
    async fn empty_subjects_are_skipped() {
        let f = RateLimiterFilter::new(&config(RateBy::Both, 10.0, 1, vec![]));
        // No IP and no pubkey: nothing to key on, always admitted.
        for _ in 0..5 {
            assert!(run(&f, &event(1, "", ""), "").await.is_accept());
        }
    }

    #[tokio::test]
    async fn disabled_filter_accepts() {
        let mut cfg = config(RateBy::Ip, 10.0, 1, vec![]);
        cfg.enabled = false;
        let f = RateLimiterFilter::new(&cfg);
        for _ in 0..5 {
            assert!(run(&f, &event(1, &"aa".repeat(32), ""), "1.1.1.1").await.is_accept());
        }
    }
}
