//! Emergency admission control for previously-unseen pubkeys.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmergencyConfig;
use crate::event::Event;
use crate::limiter::{TokenBucket, TtlCache};
use crate::policy::{Filter, Meta, Verdict, META_REMOTE_IP};

struct PerIp {
    buckets: TtlCache<String, Arc<TokenBucket>>,
    rate: f64,
    burst: u32,
    ipv4_prefix: u8,
    ipv6_prefix: u8,
}

pub struct EmergencyFilter {
    enabled: bool,
    global_bucket: TokenBucket,
    seen_pubkeys: TtlCache<String, ()>,
    per_ip: Option<PerIp>,
}

impl EmergencyFilter {
    pub fn new(cfg: &EmergencyConfig) -> Self {
        if !cfg.enabled {
            return Self {
                enabled: false,
                global_bucket: TokenBucket::new(f64::INFINITY, 0),
                seen_pubkeys: TtlCache::new(1, std::time::Duration::from_secs(1)),
                per_ip: None,
            };
        }

        let per_ip = cfg.per_ip.enabled.then(|| PerIp {
            buckets: TtlCache::new(cfg.per_ip.cache_size, cfg.per_ip.ttl),
            rate: cfg.per_ip.rate,
            burst: cfg.per_ip.burst,
            ipv4_prefix: cfg.per_ip.ipv4_prefix,
            ipv6_prefix: cfg.per_ip.ipv6_prefix,
        });

        Self {
            enabled: true,
            global_bucket: TokenBucket::new(cfg.new_keys_rate, cfg.new_keys_burst),
            seen_pubkeys: TtlCache::new(cfg.cache_size, cfg.ttl),
            per_ip,
        }
    }
}

#[async_trait]
impl Filter for EmergencyFilter {
    fn name(&self) -> &'static str {
        "EmergencyFilter"
    }

    async fn matches(&self, event: &Event, meta: &mut Meta) -> Verdict {
        if !self.enabled {
            return Verdict::accept("filter_disabled");
        }
        if event.pubkey.is_empty() {
            return Verdict::accept("pubkey_empty");
        }
        if self.seen_pubkeys.get(&event.pubkey).is_some() {
            return Verdict::accept("pubkey_recently_seen");
        }

        let remote_ip = meta.get(META_REMOTE_IP).map(String::as_str).unwrap_or("");
        if let Some(per_ip) = &self.per_ip {
            if !remote_ip.is_empty() {
                let key = canonicalize_ip(remote_ip, per_ip.ipv4_prefix, per_ip.ipv6_prefix);
                let bucket = match per_ip.buckets.get(&key) {
                    Some(bucket) => bucket,
                    None => {
                        let bucket = Arc::new(TokenBucket::new(per_ip.rate, per_ip.burst));
                        per_ip.buckets.add(key, bucket.clone());
                        bucket
                    }
                };
                if !bucket.allow() {
                    return Verdict::reject("new_pubkey_rate_limit_exceeded_per_ip");
                }
            }
        }

        if !self.global_bucket.allow() {
            return Verdict::reject("new_pubkey_rate_limit_exceeded_global");
        }

        self.seen_pubkeys.add(event.pubkey.clone(), ());
        Verdict::accept("new_pubkey_accepted")
    }
}

/// Key for per-IP buckets: the address masked to the configured prefix
/// (`0` keys on the raw address). Unparseable input keys on itself.
fn canonicalize_ip(raw: &str, v4_prefix: u8, v6_prefix: u8) -> String {
    let Ok(addr) = raw.parse::<IpAddr>() else {
        return raw.to_string();
    };
    match addr {
        IpAddr::V4(v4) => {
            if v4_prefix > 0 && v4_prefix <= 32 {
                let mask = u32::MAX << (32 - u32::from(v4_prefix));
                let network = std::net::Ipv4Addr::from(u32::from(v4) & mask);
                format!("{network}/{v4_prefix}")
            } else {
                v4.to_string()
            }
        }
        IpAddr::V6(v6) => {
            if v6_prefix > 0 && v6_prefix <= 128 {
                let mask = u128::MAX << (128 - u32::from(v6_prefix));
                let network = std::net::Ipv6Addr::from(u128::from(v6) & mask);
                format!("{network}/{v6_prefix}")
            } else {
                v6.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmergencyPerIpConfig;
    use crate::filters::testutil::event;

    fn config(global_rate: f64, global_burst: u32, per_ip: Option<EmergencyPerIpConfig>) -> EmergencyConfig {
        EmergencyConfig {
            enabled: true,
            new_keys_rate: global_rate,
            new_keys_burst: global_burst,
            per_ip: per_ip.unwrap_or_default(),
            ..EmergencyConfig::default()
        }
    }

    async fn run(f: &EmergencyFilter, pubkey: &str, ip: &str) -> Verdict {
        let mut meta = Meta::new();
        meta.insert(META_REMOTE_IP.to_string(), ip.to_string());
        f.matches(&event(1, pubkey, ""), &mut meta).await
    }

    #[test]
    fn ip_canonicalization_applies_prefixes() {
        assert_eq!(canonicalize_ip("203.0.113.77", 24, 0), "203.0.113.0/24");
        assert_eq!(canonicalize_ip("203.0.113.77", 0, 0), "203.0.113.77");
        assert_eq!(canonicalize_ip("2001:db8::1", 0, 48), "2001:db8::/48");
        assert_eq!(canonicalize_ip("2001:db8::1", 0, 0), "2001:db8::1");
        assert_eq!(canonicalize_ip("not-an-ip", 24, 48), "not-an-ip");
    }

    #[tokio::test]
    async fn known_pubkeys_bypass_the_buckets() {
        let f = EmergencyFilter::new(&config(1.0, 1, None));
        let pk = "aa".repeat(32);

        assert!(run(&f, &pk, "").await.is_accept());
        // Global burst is spent, but the same pubkey is now known.
        for _ in 0..3 {
            assert!(run(&f, &pk, "").await.is_accept());
        }
        // A different new pubkey hits the drained global bucket.
        let v = run(&f, &"bb".repeat(32), "").await;
        assert!(matches!(v, Verdict::Reject(r) if r == "new_pubkey_rate_limit_exceeded_global"));
    }

    #[tokio::test]
    async fn per_ip_prefix_groups_addresses() {
        let per_ip = EmergencyPerIpConfig {
            enabled: true,
            rate: 1.0,
            burst: 1,
            ipv4_prefix: 24,
            ..EmergencyPerIpConfig::default()
        };
        let f = EmergencyFilter::new(&config(1000.0, 1000, Some(per_ip)));

        assert!(run(&f, &"aa".repeat(32), "203.0.113.1").await.is_accept());
        // Different address, same /24: shares the drained bucket.
        let v = run(&f, &"bb".repeat(32), "203.0.113.2").await;
        assert!(matches!(v, Verdict::Reject(r) if r == "new_pubkey_rate_limit_exceeded_per_ip"));
        // Outside the /24 a fresh bucket applies.
        assert!(run(&f, &"cc".repeat(32), "203.0.114.1").await.is_accept());
    }

    #[tokio::test]
    async fn empty_pubkey_and_disabled_filter_accept() {
        let f = EmergencyFilter::new(&config(0.0, 0, None));
        assert!(run(&f, "", "1.2.3.4").await.is_accept());

        let f = EmergencyFilter::new(&EmergencyConfig::default());
        assert!(run(&f, &"aa".repeat(32), "1.2.3.4").await.is_accept());
    }

    #[tokio::test]
    async fn missing_ip_skips_per_ip_check() {
        let per_ip = EmergencyPerIpConfig {
            enabled: true,
            rate: 0.0,
            burst: 0,
            ..EmergencyPerIpConfig::default()
        };
        let f = EmergencyFilter::new(&config(1000.0, 1000, Some(per_ip)));
        assert!(run(&f, &"aa".repeat(32), "").await.is_accept());
    }
}
