//! Tag shape constraints.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TagsConfig;
use crate::event::Event;
use crate::policy::{Filter, Meta, Verdict};

struct ProcessedRule {
    max_tags: Option<usize>,
    required_tags: HashSet<String>,
    max_tag_counts: HashMap<String, usize>,
}

pub struct TagsFilter {
    rules_by_kind: HashMap<u32, Arc<ProcessedRule>>,
}

impl TagsFilter {
    pub fn new(cfg: &TagsConfig) -> Self {
        let mut rules_by_kind = HashMap::new();
        for rule in &cfg.rules {
            let processed = Arc::new(ProcessedRule {
                max_tags: rule.max_tags,
                required_tags: rule.required_tags.iter().cloned().collect(),
                max_tag_counts: rule.max_tag_counts.clone(),
            });
            for kind in &rule.kinds {
                rules_by_kind.insert(*kind, processed.clone());
            }
        }
        Self { rules_by_kind }
    }
}

#[async_trait]
impl Filter for TagsFilter {
    fn name(&self) -> &'static str {
        "TagsFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        let Some(rule) = self.rules_by_kind.get(&event.kind) else {
            return Verdict::accept("no_rules_for_kind");
        };

        if let Some(max) = rule.max_tags {
            if event.tags.len() > max {
                return Verdict::reject(format!(
                    "too_many_tags:got_{},max_{max}",
                    event.tags.len()
                ));
            }
        }

        if !rule.required_tags.is_empty() || !rule.max_tag_counts.is_empty() {
            let mut found: HashSet<&str> = HashSet::new();
            let mut counts: HashMap<&str, usize> = HashMap::new();

            for tag in &event.tags {
                let Some(name) = tag.name() else { continue };
                if rule.max_tag_counts.contains_key(name) {
                    *counts.entry(name).or_default() += 1;
                }
                if rule.required_tags.contains(name) {
                    found.insert(name);
                }
            }

            for required in &rule.required_tags {
                if !found.contains(required.as_str()) {
                    return Verdict::reject(format!("missing_required_tag:'{required}'"));
                }
            }

            for (name, limit) in &rule.max_tag_counts {
                let count = counts.get(name.as_str()).copied().unwrap_or(0);
                if count > *limit {
                    return Verdict::reject(format!(
                        "too_many_tags:'{name}',got_{count},max_{limit}"
                    ));
                }
            }
        }

        Verdict::accept("tags_ok")
    }
}
