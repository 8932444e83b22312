//! Configuration loading from TOML files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Serde adapter for humantime duration strings (`"45m"`, `"1h30m"`).
mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Log severity, both for the global level and per-filter overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Per-filter severity for rejection log lines; `warn` otherwise.
    pub rejection_levels: HashMap<String, LogLevel>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            rejection_levels: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./gatr-db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrfryConfig {
    pub executable_path: PathBuf,
    pub config_path: PathBuf,
}

impl Default for StrfryConfig {
    fn default() -> Self {
        Self {
            executable_path: PathBuf::from("/usr/local/bin/strfry"),
            config_path: PathBuf::from("/etc/strfry.conf"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub moderator_pubkey: String,
    pub ban_emoji: String,
    pub unban_emoji: String,
    #[serde(with = "duration")]
    pub ban_duration: Duration,
    pub allowed_kinds: Vec<u32>,
    pub denied_kinds: Vec<u32>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            moderator_pubkey: String::new(),
            ban_emoji: "🔨".into(),
            unban_emoji: "🔓".into(),
            ban_duration: Duration::from_secs(30 * 24 * 3600),
            allowed_kinds: Vec::new(),
            denied_kinds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiltersConfig {
    pub emergency: EmergencyConfig,
    pub rate_limiter: RateLimiterConfig,
    pub freshness: FreshnessConfig,
    pub size: SizeConfig,
    pub tags: TagsConfig,
    pub keywords: KeywordConfig,
    pub language: LanguageConfig,
    pub ephemeral_chat: EphemeralChatConfig,
    pub repost_abuse: RepostAbuseConfig,
    pub banned_author: BannedAuthorConfig,
    pub autoban: AutoBanConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmergencyConfig {
    pub enabled: bool,
    pub new_keys_rate: f64,
    pub new_keys_burst: u32,
    pub cache_size: usize,
    #[serde(with = "duration")]
    pub ttl: Duration,
    pub per_ip: EmergencyPerIpConfig,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            new_keys_rate: 0.0,
            new_keys_burst: 0,
            cache_size: 65536,
            ttl: Duration::from_secs(600),
            per_ip: EmergencyPerIpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmergencyPerIpConfig {
    pub enabled: bool,
    pub rate: f64,
    pub burst: u32,
    pub cache_size: usize,
    #[serde(with = "duration")]
    pub ttl: Duration,
    /// Mask prefix applied before keying; `0` keys on the raw address.
    pub ipv4_prefix: u8,
    pub ipv6_prefix: u8,
}

impl Default for EmergencyPerIpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 0.0,
            burst: 0,
            cache_size: 65536,
            ttl: Duration::from_secs(600),
            ipv4_prefix: 0,
            ipv6_prefix: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateBy {
    Ip,
    Pubkey,
    Both,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    pub by: Option<RateBy>,
    pub cache_size: usize,
    #[serde(with = "duration")]
    pub ttl: Duration,
    pub default_rate: f64,
    pub default_burst: u32,
    #[serde(rename = "rule")]
    pub rules: Vec<RateLimitRule>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            by: None,
            cache_size: 65536,
            ttl: Duration::from_secs(600),
            default_rate: 0.0,
            default_burst: 0,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitRule {
    pub description: String,
    pub kinds: Vec<u32>,
    pub rate: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreshnessConfig {
    /// Zero disables that side of the window.
    #[serde(with = "duration", default)]
    pub default_max_past: Duration,
    #[serde(with = "duration", default)]
    pub default_max_future: Duration,
    #[serde(rename = "rule")]
    pub rules: Vec<FreshnessRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreshnessRule {
    pub description: String,
    pub kinds: Vec<u32>,
    #[serde(with = "duration", default)]
    pub max_past: Duration,
    #[serde(with = "duration", default)]
    pub max_future: Duration,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizeConfig {
    pub default_max_size_bytes: usize,
    #[serde(rename = "rule")]
    pub rules: Vec<SizeRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SizeRule {
    pub description: String,
    pub kinds: Vec<u32>,
    pub max_size_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagsConfig {
    #[serde(rename = "rule")]
    pub rules: Vec<TagRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagRule {
    pub description: String,
    pub kinds: Vec<u32>,
    pub max_tags: Option<usize>,
    pub required_tags: Vec<String>,
    pub max_tag_counts: HashMap<String, usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeywordConfig {
    pub enabled: bool,
    #[serde(rename = "rule")]
    pub rules: Vec<KeywordRule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeywordRule {
    pub description: String,
    pub kinds: Vec<u32>,
    pub words: Vec<String>,
    pub regexps: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageConfig {
    pub enabled: bool,
    pub allowed_languages: Vec<String>,
    pub kinds_to_check: Vec<u32>,
    pub min_length_for_check: usize,
    #[serde(with = "duration")]
    pub approved_cache_ttl: Duration,
    pub approved_cache_size: usize,
    /// `primary → (detected-or-"default" → confidence)`.
    pub primary_accept_threshold: HashMap<String, HashMap<String, f64>>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_languages: Vec::new(),
            kinds_to_check: Vec::new(),
            min_length_for_check: 0,
            approved_cache_ttl: Duration::from_secs(3600),
            approved_cache_size: 10_000,
            primary_accept_threshold: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EphemeralChatConfig {
    pub enabled: bool,
    pub kinds: Vec<u32>,
    #[serde(with = "duration")]
    pub min_delay_between_messages: Duration,
    pub max_caps_ratio: f64,
    pub min_letters_for_caps_check: usize,
    pub max_character_repetitions: usize,
    pub max_word_length: usize,
    pub block_zalgo_text: bool,
    pub cache_size: usize,
    pub rate_limit_rate: f64,
    pub rate_limit_burst: u32,
    pub required_pow_on_limit: u32,
}

impl Default for EphemeralChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kinds: Vec::new(),
            min_delay_between_messages: Duration::ZERO,
            max_caps_ratio: 0.0,
            min_letters_for_caps_check: 20,
            max_character_repetitions: 0,
            max_word_length: 0,
            block_zalgo_text: false,
            cache_size: 10_000,
            rate_limit_rate: 0.0,
            rate_limit_burst: 0,
            required_pow_on_limit: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepostAbuseConfig {
    pub enabled: bool,
    pub max_ratio: f64,
    pub min_events: u32,
    #[serde(with = "duration")]
    pub reset_duration: Duration,
    #[serde(with = "duration")]
    pub cache_ttl: Duration,
    pub count_reject_as_activity: bool,
    pub require_nip21_in_quote: bool,
}

impl Default for RepostAbuseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_ratio: 1.0,
            min_events: 0,
            reset_duration: Duration::ZERO,
            cache_ttl: Duration::from_secs(24 * 3600),
            count_reject_as_activity: false,
            require_nip21_in_quote: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BannedAuthorConfig {
    pub check_nip26: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoBanConfig {
    pub enabled: bool,
    pub max_strikes: u32,
    #[serde(with = "duration")]
    pub strike_window: Duration,
    #[serde(with = "duration")]
    pub ban_duration: Duration,
    pub strikes_cache_size: usize,
    pub cooldown_cache_size: usize,
    #[serde(with = "duration")]
    pub cooldown_duration: Duration,
    #[serde(with = "duration")]
    pub ban_timeout: Duration,
    pub exclude_filters_from_strikes: Vec<String>,
}

impl Default for AutoBanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_strikes: 0,
            strike_window: Duration::ZERO,
            ban_duration: Duration::ZERO,
            strikes_cache_size: 10_000,
            cooldown_cache_size: 10_000,
            cooldown_duration: Duration::from_secs(60),
            ban_timeout: Duration::from_secs(5),
            exclude_filters_from_strikes: Vec::new(),
        }
    }
}

/// Root of the TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub log: LogConfig,
    pub database: DbConfig,
    pub strfry: StrfryConfig,
    pub policy: PolicyConfig,
    pub filters: FiltersConfig,
}

impl Config {
    /// Load and validate the configuration. With `use_defaults` a
    /// missing file falls back to built-in defaults; the returned bool
    /// reports whether that happened.
    pub fn load(path: &std::path::Path, use_defaults: bool) -> Result<(Self, bool)> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if use_defaults {
                    let cfg = Config::default();
                    cfg.validate()?;
                    return Ok((cfg, true));
                }
                bail!("config file not found at {}", path.display());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config file {}", path.display()))
            }
        };
        let cfg: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        cfg.validate()?;
        Ok((cfg, false))
    }

    pub fn validate(&self) -> Result<()> {
        // --- [policy] ---
        if self.policy.ban_duration.is_zero() {
            bail!("policy.ban_duration must be a positive duration (e.g. '24h')");
        }
        if !self.policy.moderator_pubkey.is_empty()
            && self.policy.ban_emoji.is_empty()
            && self.policy.unban_emoji.is_empty()
        {
            bail!("policy.ban_emoji or policy.unban_emoji must be set when a moderator is configured");
        }
        let overlap: Vec<u32> = self
            .policy
            .allowed_kinds
            .iter()
            .filter(|k| self.policy.denied_kinds.contains(k))
            .copied()
            .collect();
        if !overlap.is_empty() {
            bail!("policy.allowed_kinds and policy.denied_kinds must not contain common kinds: {overlap:?}");
        }

        // --- [filters.rate_limiter] ---
        let rl = &self.filters.rate_limiter;
        if rl.enabled {
            if rl.default_rate < 0.0 || rl.default_burst == 0 {
                bail!("filters.rate_limiter: default_rate and default_burst must be > 0 when enabled");
            }
            for (i, rule) in rl.rules.iter().enumerate() {
                if rule.rate < 0.0 || rule.burst == 0 {
                    bail!(
                        "filters.rate_limiter.rule[{i}] ('{}'): rate and burst must be > 0",
                        rule.description
                    );
                }
            }
        }

        // --- [filters.keywords] ---
        if self.filters.keywords.enabled {
            for (i, rule) in self.filters.keywords.rules.iter().enumerate() {
                if rule.kinds.is_empty() {
                    bail!(
                        "filters.keywords.rule[{i}] ('{}'): must specify kinds",
                        rule.description
                    );
                }
                if rule.words.is_empty() && rule.regexps.is_empty() {
                    bail!(
                        "filters.keywords.rule[{i}] ('{}'): must contain at least one word or regexp",
                        rule.description
                    );
                }
            }
        }

        // --- [filters.language] ---
        let lang = &self.filters.language;
        if lang.enabled {
            if lang.allowed_languages.is_empty() {
                bail!("filters.language.allowed_languages must not be empty when enabled");
            }
            if lang.kinds_to_check.is_empty() {
                bail!("filters.language.kinds_to_check must not be empty when enabled");
            }
            for (primary, similar) in &lang.primary_accept_threshold {
                if !lang
                    .allowed_languages
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(primary))
                {
                    bail!(
                        "filters.language.primary_accept_threshold: primary language '{primary}' is not in allowed_languages"
                    );
                }
                for (detected, confidence) in similar {
                    if !(0.0..=1.0).contains(confidence) {
                        bail!(
                            "filters.language.primary_accept_threshold['{primary}']: confidence for '{detected}' is out of range [0.0, 1.0], got {confidence}"
                        );
                    }
                }
            }
        }

        // --- [filters.ephemeral_chat] ---
        let ec = &self.filters.ephemeral_chat;
        if ec.enabled {
            if ec.kinds.is_empty() {
                bail!("filters.ephemeral_chat.kinds must not be empty when enabled");
            }
            if !(0.0..=1.0).contains(&ec.max_caps_ratio) {
                bail!("filters.ephemeral_chat.max_caps_ratio must be between 0.0 and 1.0");
            }
            if ec.min_letters_for_caps_check == 0
                || ec.max_word_length == 0
                || ec.required_pow_on_limit == 0
            {
                bail!("filters.ephemeral_chat: min_letters_for_caps_check, max_word_length, and required_pow_on_limit must be > 0 when enabled");
            }
        }

        // --- [filters.repost_abuse] ---
        let ra = &self.filters.repost_abuse;
        if ra.enabled {
            if !(0.0..=1.0).contains(&ra.max_ratio) {
                bail!("filters.repost_abuse.max_ratio must be between 0.0 and 1.0");
            }
            if ra.cache_ttl.is_zero() {
                bail!("filters.repost_abuse.cache_ttl must be a positive duration");
            }
        }

        // --- [filters.autoban] ---
        let ab = &self.filters.autoban;
        if ab.enabled {
            if ab.max_strikes == 0 {
                bail!("filters.autoban.max_strikes must be > 0");
            }
            if ab.strike_window.is_zero() {
                bail!("filters.autoban.strike_window must be a positive duration");
            }
            if ab.ban_duration.is_zero() {
                bail!("filters.autoban.ban_duration must be a positive duration");
            }
            if ab.strikes_cache_size == 0 {
                bail!("filters.autoban.strikes_cache_size must be > 0");
            }
            if ab.cooldown_cache_size == 0 {
                bail!("filters.autoban.cooldown_cache_size must be > 0");
            }
            if ab.cooldown_duration.is_zero() {
                bail!("filters.autoban.cooldown_duration must be a positive duration");
            }
        }

        // --- [filters.emergency] ---
        let em = &self.filters.emergency;
        if em.enabled {
            if em.new_keys_rate <= 0.0 && !em.new_keys_rate.is_infinite() {
                bail!("filters.emergency.new_keys_rate must be > 0 when enabled");
            }
            if em.per_ip.enabled && em.per_ip.rate <= 0.0 {
                bail!("filters.emergency.per_ip.rate must be > 0 when enabled");
            }
            if em.per_ip.ipv4_prefix > 32 {
                bail!("filters.emergency.per_ip.ipv4_prefix must be between 0 and 32");
            }
            if em.per_ip.ipv6_prefix > 128 {
                bail!("filters.emergency.per_ip.ipv6_prefix must be between 0 and 128");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.policy.ban_emoji, "🔨");
        assert_eq!(cfg.database.path, PathBuf::from("./gatr-db"));
    }

    #[test]
    fn loads_full_file() {
        let (_dir, path) = write_config(
            r#"
[log]
level = "debug"
[log.rejection_levels]
RateLimiterFilter = "info"

[policy]
moderator_pubkey = "abc"
ban_duration = "45m"
allowed_kinds = [1, 7]
denied_kinds = [3]

[filters.rate_limiter]
enabled = true
by = "ip"
default_rate = 10.0
default_burst = 5
ttl = "10m"

[[filters.rate_limiter.rule]]
description = "chat"
kinds = [42]
rate = 2.0
burst = 3

[filters.freshness]
default_max_past = "2h"

[[filters.freshness.rule]]
kinds = [30023]
max_past = "30d"
"#,
        );
        let (cfg, defaults_used) = Config::load(&path, false).unwrap();
        assert!(!defaults_used);
        assert_eq!(cfg.log.level, LogLevel::Debug);
        assert_eq!(
            cfg.log.rejection_levels.get("RateLimiterFilter"),
            Some(&LogLevel::Info)
        );
        assert_eq!(cfg.policy.ban_duration, Duration::from_secs(45 * 60));
        assert_eq!(cfg.filters.rate_limiter.by, Some(RateBy::Ip));
        assert_eq!(cfg.filters.rate_limiter.rules.len(), 1);
        assert_eq!(cfg.filters.rate_limiter.rules[0].kinds, vec![42]);
        assert_eq!(
            cfg.filters.freshness.default_max_past,
            Duration::from_secs(2 * 3600)
        );
        assert_eq!(
            cfg.filters.freshness.rules[0].max_past,
            Duration::from_secs(30 * 24 * 3600)
        );
    }

    #[test]
    fn example_config_loads() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config.example.toml");
        let (cfg, defaults_used) = Config::load(&path, false).unwrap();
        assert!(!defaults_used);
        assert_eq!(cfg.filters.rate_limiter.rules.len(), 1);
        assert_eq!(
            cfg.filters.autoban.cooldown_duration,
            Duration::from_secs(60)
        );
        assert_eq!(
            cfg.filters.tags.rules[0].max_tag_counts.get("e"),
            Some(&50)
        );
    }

    #[test]
    fn missing_file_without_defaults_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Config::load(&path, false).is_err());
        let (cfg, defaults_used) = Config::load(&path, true).unwrap();
        assert!(defaults_used);
        assert_eq!(cfg.strfry.executable_path, PathBuf::from("/usr/local/bin/strfry"));
    }

    #[test]
    fn rejects_invalid_log_level() {
        let (_dir, path) = write_config("[log]\nlevel = \"loud\"\n");
        assert!(Config::load(&path, false).is_err());
    }

    #[test]
    fn rejects_moderator_without_emojis() {
        let mut cfg = Config::default();
        cfg.policy.moderator_pubkey = "abc".into();
        cfg.policy.ban_emoji.clear();
        cfg.policy.unban_emoji.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_kind_list_overlap() {
        let mut cfg = Config::default();
        cfg.policy.moderator_pubkey = "abc".into();
        cfg.policy.allowed_kinds = vec![1, 7];
        cfg.policy.denied_kinds = vec![7];
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("common kinds"));
    }

    #[test]
    fn rejects_enabled_rate_limiter_without_burst() {
        let mut cfg = Config::default();
        cfg.policy.moderator_pubkey = "abc".into();
        cfg.filters.rate_limiter.enabled = true;
        cfg.filters.rate_limiter.default_rate = 1.0;
        cfg.filters.rate_limiter.default_burst = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_threshold_outside_range() {
        let mut cfg = Config::default();
        cfg.policy.moderator_pubkey = "abc".into();
        cfg.filters.language.enabled = true;
        cfg.filters.language.allowed_languages = vec!["english".into()];
        cfg.filters.language.kinds_to_check = vec![1];
        cfg.filters.language.primary_accept_threshold.insert(
            "english".into(),
            HashMap::from([("default".into(), 1.5)]),
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_threshold_primary_not_allowed() {
        let mut cfg = Config::default();
        cfg.policy.moderator_pubkey = "abc".into();
        cfg.filters.language.enabled = true;
        cfg.filters.language.allowed_languages = vec!["english".into()];
        cfg.filters.language.kinds_to_check = vec![1];
        cfg.filters.language.primary_accept_threshold.insert(
            "german".into(),
            HashMap::from([("default".into(), 0.9)]),
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        let (_dir, path) = write_config("[policy]\nmoderator = \"typo\"\n");
        assert!(Config::load(&path, false).is_err());
    }

    #[test]
    fn autoban_section_constraints() {
        let mut cfg = Config::default();
        cfg.policy.moderator_pubkey = "abc".into();
        cfg.filters.autoban.enabled = true;
        cfg.filters.autoban.max_strikes = 3;
        cfg.filters.autoban.strike_window = Duration::from_secs(1);
        cfg.filters.autoban.ban_duration = Duration::ZERO;
        assert!(cfg.validate().is_err());
        cfg.filters.autoban.ban_duration = Duration::from_secs(45 * 60);
        cfg.validate().unwrap();
    }
}
