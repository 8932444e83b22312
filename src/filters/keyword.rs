//! Forbidden words and patterns in event content.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

use crate::config::KeywordConfig;
use crate::event::Event;
use crate::policy::{Filter, Meta, Verdict};

#[derive(Debug)]
struct CompiledRule {
    /// The word or pattern as written in the config, for the reason code.
    source: String,
    regex: Regex,
}

#[derive(Debug)]
pub struct KeywordFilter {
    enabled: bool,
    rules_by_kind: HashMap<u32, Vec<CompiledRule>>,
}

impl KeywordFilter {
    pub fn new(cfg: &KeywordConfig) -> Result<Self> {
        if !cfg.enabled {
            return Ok(Self {
                enabled: false,
                rules_by_kind: HashMap::new(),
            });
        }

        let mut rules_by_kind: HashMap<u32, Vec<CompiledRule>> = HashMap::new();
        for rule in &cfg.rules {
            // Plain words become case-insensitive whole-word patterns.
            for word in &rule.words {
                let regex = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(word)))
                    .case_insensitive(true)
                    .build()
                    .with_context(|| format!("internal error compiling keyword '{word}'"))?;
                for kind in &rule.kinds {
                    rules_by_kind.entry(*kind).or_default().push(CompiledRule {
                        source: word.clone(),
                        regex: regex.clone(),
                    });
                }
            }
            // User regexps compile as written.
            for pattern in &rule.regexps {
                let regex = Regex::new(pattern).with_context(|| {
                    format!(
                        "failed to compile user regexp '{pattern}' for rule '{}'",
                        rule.description
                    )
                })?;
                for kind in &rule.kinds {
                    rules_by_kind.entry(*kind).or_default().push(CompiledRule {
                        source: pattern.clone(),
                        regex: regex.clone(),
                    });
                }
            }
        }

        Ok(Self {
            enabled: true,
            rules_by_kind,
        })
    }
}

#[async_trait]
impl Filter for KeywordFilter {
    fn name(&self) -> &'static str {
        "KeywordFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        if !self.enabled {
            return Verdict::accept("filter_disabled");
        }
        let Some(rules) = self.rules_by_kind.get(&event.kind) else {
            return Verdict::accept("no_rules_for_kind");
        };
        for rule in rules {
            if rule.regex.is_match(&event.content) {
                return Verdict::reject(format!("forbidden_pattern_found:'{}'", rule.source));
            }
        }
        Verdict::accept("no_forbidden_patterns_found")
    }
}
