//! Serialized-size cap.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::SizeConfig;
use crate::event::Event;
use crate::policy::{Filter, Meta, Verdict};

pub struct SizeFilter {
    default_max: usize,
    rules_by_kind: HashMap<u32, usize>,
}

impl SizeFilter {
    pub fn new(cfg: &SizeConfig) -> Self {
        let mut rules_by_kind = HashMap::new();
        for rule in &cfg.rules {
            for kind in &rule.kinds {
                rules_by_kind.insert(*kind, rule.max_size_bytes);
            }
        }
        Self {
            default_max: cfg.default_max_size_bytes,
            rules_by_kind,
        }
    }
}

#[async_trait]
impl Filter for SizeFilter {
    fn name(&self) -> &'static str {
        "SizeFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        let max = self
            .rules_by_kind
            .get(&event.kind)
            .copied()
            .unwrap_or(self.default_max);
        if max == 0 {
            return Verdict::accept("size_unlimited_for_kind");
        }

        // The measured representation must match what the relay
        // persists; see DESIGN.md before tightening limits.
        let size = match serde_json::to_vec(event) {
            Ok(raw) => raw.len(),
            Err(err) => {
                return Verdict::Error {
                    reason: "internal_marshal_failed",
                    source: err.into(),
                }
            }
        };

        if size > max {
            return Verdict::reject(format!("event_too_large:size_{size},max_{max}"));
        }
        Verdict::accept("size_ok")
    }
}
