//! Kind allow/deny gate.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::config::PolicyConfig;
use crate::event::Event;
use crate::policy::{Filter, Meta, Verdict};

pub struct KindFilter {
    /// `None` means every kind not denied is allowed.
    allowed: Option<HashSet<u32>>,
    denied: HashSet<u32>,
}

impl KindFilter {
    pub fn new(cfg: &PolicyConfig) -> Self {
        let allowed = if cfg.allowed_kinds.is_empty() {
            None
        } else {
            Some(cfg.allowed_kinds.iter().copied().collect())
        };
        Self {
            allowed,
            denied: cfg.denied_kinds.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl Filter for KindFilter {
    fn name(&self) -> &'static str {
        "KindFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        // Denylist has priority.
        if self.denied.contains(&event.kind) {
            return Verdict::reject(format!("kind_{}_denied", event.kind));
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(&event.kind) {
                return Verdict::reject(format!("kind_{}_not_allowed", event.kind));
            }
        }
        Verdict::accept("kind_allowed")
    }
}
