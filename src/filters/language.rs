//! Content-language gate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use whatlang::{Detector, Lang};

use crate::config::LanguageConfig;
use crate::event::Event;
use crate::limiter::TtlCache;
use crate::policy::{Filter, Meta, Verdict};

/// Tokens that carry no language signal: URLs, e-mail addresses,
/// nostr URIs, hashtags and digit-bearing words.
static CONTENT_CLEANER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"((https?|wss?)://|www\.|ww\.)[^\s/?.#-]+\S*|[a-zA-Z0-9.!$%&'’+_`\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,64}|nostr:[a-z0-9]+|#\S+|[a-zA-Z]*[0-9]+[a-zA-Z0-9]*",
    )
    .unwrap()
});

/// Process-wide name lookup: english name, ISO 639-3 and ISO 639-1
/// spellings all resolve to the same language.
static LANG_LOOKUP: Lazy<HashMap<String, Lang>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for &lang in Lang::all() {
        map.insert(lang.eng_name().to_lowercase(), lang);
        map.insert(lang.code().to_lowercase(), lang);
        if let Some(short) = iso639_1(lang) {
            map.insert(short.to_string(), lang);
        }
    }
    map
});

/// ISO 639-1 codes for the languages that have one and show up in
/// relay configs; everything else keeps its 639-3 code.
fn iso639_1(lang: Lang) -> Option<&'static str> {
    Some(match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Rus => "ru",
        Lang::Jpn => "ja",
        Lang::Por => "pt",
        Lang::Ita => "it",
        Lang::Kor => "ko",
        Lang::Ara => "ar",
        Lang::Hin => "hi",
        Lang::Ben => "bn",
        Lang::Vie => "vi",
        Lang::Tha => "th",
        Lang::Cmn => "zh",
        Lang::Nld => "nl",
        Lang::Pol => "pl",
        Lang::Swe => "sv",
        Lang::Ukr => "uk",
        Lang::Tur => "tr",
        Lang::Ces => "cs",
        Lang::Ell => "el",
        Lang::Heb => "he",
        Lang::Ind => "id",
        Lang::Pes => "fa",
        Lang::Ron => "ro",
        Lang::Hun => "hu",
        Lang::Fin => "fi",
        Lang::Dan => "da",
        Lang::Nob => "no",
        _ => return None,
    })
}

fn lang_code(lang: Lang) -> &'static str {
    iso639_1(lang).unwrap_or_else(|| lang.code())
}

fn lookup(name: &str) -> Option<Lang> {
    LANG_LOOKUP.get(&name.to_lowercase()).copied()
}

/// Relative confidence that `text` is `primary` rather than the
/// language detection settled on, via a two-candidate detector.
fn confidence_for(primary: Lang, detected: Lang, text: &str) -> f64 {
    if primary == detected {
        return 1.0;
    }
    let detector = Detector::with_allowlist(vec![primary, detected]);
    match detector.detect(text) {
        Some(info) if info.lang() == primary => info.confidence(),
        _ => 0.0,
    }
}

pub struct LanguageFilter {
    cfg: LanguageConfig,
    allowed_langs: HashSet<Lang>,
    checked_kinds: HashSet<u32>,
    approved_cache: Option<TtlCache<String, ()>>,
    thresholds: HashMap<Lang, HashMap<Lang, f64>>,
    default_thresholds: HashMap<Lang, f64>,
}

impl LanguageFilter {
    pub fn new(cfg: &LanguageConfig) -> Self {
        if !cfg.enabled {
            return Self {
                cfg: cfg.clone(),
                allowed_langs: HashSet::new(),
                checked_kinds: HashSet::new(),
                approved_cache: None,
                thresholds: HashMap::new(),
                default_thresholds: HashMap::new(),
            };
        }

        let mut allowed_langs = HashSet::new();
        for name in &cfg.allowed_languages {
            match lookup(name) {
                Some(lang) => {
                    allowed_langs.insert(lang);
                }
                None => warn!(lang = %name, "unsupported language name or ISO code in config; ignored"),
            }
        }

        let mut thresholds: HashMap<Lang, HashMap<Lang, f64>> = HashMap::new();
        let mut default_thresholds = HashMap::new();
        for (primary_name, similar_map) in &cfg.primary_accept_threshold {
            let Some(primary) = lookup(primary_name) else {
                warn!(lang = %primary_name, "primary language in threshold rules not found, skipping rule");
                continue;
            };
            let entry = thresholds.entry(primary).or_default();
            for (similar_name, confidence) in similar_map {
                if similar_name.eq_ignore_ascii_case("default") {
                    default_thresholds.insert(primary, *confidence);
                } else if let Some(similar) = lookup(similar_name) {
                    entry.insert(similar, *confidence);
                } else {
                    warn!(
                        primary = %primary_name,
                        similar = %similar_name,
                        "unsupported similar language in threshold rule; ignored"
                    );
                }
            }
        }

        let approved_cache = (!cfg.approved_cache_ttl.is_zero() && cfg.approved_cache_size > 0)
            .then(|| TtlCache::new(cfg.approved_cache_size, cfg.approved_cache_ttl));

        Self {
            cfg: cfg.clone(),
            allowed_langs,
            checked_kinds: cfg.kinds_to_check.iter().copied().collect(),
            approved_cache,
            thresholds,
            default_thresholds,
        }
    }

    fn approve(&self, pubkey: &str) {
        if let Some(cache) = &self.approved_cache {
            cache.add(pubkey.to_string(), ());
        }
    }
}

#[async_trait]
impl Filter for LanguageFilter {
    fn name(&self) -> &'static str {
        "LanguageFilter"
    }

    async fn matches(&self, event: &Event, meta: &mut Meta) -> Verdict {
        if !self.cfg.enabled || self.allowed_langs.is_empty() {
            return Verdict::accept("filter_disabled");
        }
        if !self.checked_kinds.contains(&event.kind) {
            return Verdict::accept("kind_not_checked");
        }
        if self.cfg.min_length_for_check > 0 && event.content.len() < self.cfg.min_length_for_check
        {
            return Verdict::accept("content_too_short");
        }
        if let Some(cache) = &self.approved_cache {
            if cache.get(&event.pubkey).is_some() {
                return Verdict::accept("pubkey_in_cache");
            }
        }

        let cleaned = CONTENT_CLEANER.replace_all(&event.content, "");
        if cleaned.len() < self.cfg.min_length_for_check {
            return Verdict::accept("cleaned_content_too_short");
        }

        let Some(info) = whatlang::detect(&cleaned) else {
            return Verdict::reject("language_undetectable");
        };
        let detected = info.lang();
        let code = lang_code(detected);

        if self.allowed_langs.contains(&detected) {
            self.approve(&event.pubkey);
            meta.insert("language".into(), code.into());
            return Verdict::accept(format!("language_allowed:'{code}'"));
        }

        // Not directly allowed: a configured primary language may still
        // claim the content above its confidence threshold.
        for (primary, similar_map) in &self.thresholds {
            let threshold = similar_map
                .get(&detected)
                .or_else(|| self.default_thresholds.get(primary))
                .copied();
            let Some(threshold) = threshold else { continue };
            if confidence_for(*primary, detected, &cleaned) > threshold {
                self.approve(&event.pubkey);
                meta.insert("language".into(), code.into());
                return Verdict::accept(format!(
                    "language_allowed_by_threshold:'{code}'_as_'{}'",
                    lang_code(*primary)
                ));
            }
        }

        Verdict::reject(format!("language_not_allowed:'{code}'"))
    }
}
