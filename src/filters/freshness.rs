//! Created-at window checks.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::FreshnessConfig;
use crate::event::Event;
use crate::policy::{Filter, Meta, Verdict};

#[derive(Clone, Copy)]
struct TimeLimits {
    max_past: Duration,
    max_future: Duration,
}

pub struct FreshnessFilter {
    default: TimeLimits,
    rules_by_kind: HashMap<u32, TimeLimits>,
}

impl FreshnessFilter {
    pub fn new(cfg: &FreshnessConfig) -> Self {
        // Later rules for the same kind overwrite earlier ones.
        let mut rules_by_kind = HashMap::new();
        for rule in &cfg.rules {
            let limits = TimeLimits {
                max_past: rule.max_past,
                max_future: rule.max_future,
            };
            for kind in &rule.kinds {
                rules_by_kind.insert(*kind, limits);
            }
        }
        Self {
            default: TimeLimits {
                max_past: cfg.default_max_past,
                max_future: cfg.default_max_future,
            },
            rules_by_kind,
        }
    }
}

#[async_trait]
impl Filter for FreshnessFilter {
    fn name(&self) -> &'static str {
        "FreshnessFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        let limits = self
            .rules_by_kind
            .get(&event.kind)
            .copied()
            .unwrap_or(self.default);

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        let age = now - event.created_at;
        if !limits.max_past.is_zero() && age > limits.max_past.as_secs() as i64 {
            return Verdict::reject(format!(
                "event_too_old:age_{age}s,max_{}s",
                limits.max_past.as_secs()
            ));
        }

        let future_offset = event.created_at - now;
        if !limits.max_future.is_zero() && future_offset > limits.max_future.as_secs() as i64 {
            return Verdict::reject(format!(
                "event_in_future:offset_{future_offset}s,max_{}s",
                limits.max_future.as_secs()
            ));
        }

        Verdict::accept("timestamp_ok")
    }
}
