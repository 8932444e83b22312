//! Automatic bans after repeated rejections.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{error, warn};

use crate::config::AutoBanConfig;
use crate::event::Event;
use crate::limiter::TtlCache;
use crate::policy::RejectionHandler;
use crate::store::BanStore;

#[derive(Clone, Copy)]
struct StrikeRecord {
    count: u32,
    first_strike: Instant,
}

pub struct AutoBanFilter {
    cfg: AutoBanConfig,
    store: Arc<dyn BanStore>,
    strikes: TtlCache<String, StrikeRecord>,
    /// Short-lived marker suppressing new strikes right after a ban.
    cooldown: TtlCache<String, ()>,
    mu: Mutex<()>,
}

impl AutoBanFilter {
    pub fn new(store: Arc<dyn BanStore>, cfg: &AutoBanConfig) -> Self {
        Self {
            strikes: TtlCache::new(cfg.strikes_cache_size, cfg.strike_window),
            cooldown: TtlCache::new(cfg.cooldown_cache_size, cfg.cooldown_duration),
            store,
            cfg: cfg.clone(),
            mu: Mutex::new(()),
        }
    }

    fn ban_async(&self, pubkey: String) {
        let store = self.store.clone();
        let duration = self.cfg.ban_duration;
        let timeout = self.cfg.ban_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.ban_author(&pubkey, duration)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(pubkey, error = %err, "failed to auto-ban author"),
                Err(_) => error!(pubkey, "auto-ban timed out"),
            }
        });
    }
}

impl RejectionHandler for AutoBanFilter {
    fn handle_rejection(&self, event: &Event, filter_name: &str) {
        if !self.cfg.enabled {
            return;
        }
        if self
            .cfg
            .exclude_filters_from_strikes
            .iter()
            .any(|f| f == filter_name)
        {
            return;
        }

        let pubkey = &event.pubkey;
        if self.cooldown.get(pubkey).is_some() {
            return;
        }

        let _guard = self.mu.lock().unwrap();
        if self.cooldown.get(pubkey).is_some() {
            return;
        }

        let record = match self.strikes.get(pubkey) {
            Some(mut record) => {
                record.count += 1;
                record
            }
            None => StrikeRecord {
                count: 1,
                first_strike: Instant::now(),
            },
        };
        self.strikes.add(pubkey.clone(), record);

        if record.count >= self.cfg.max_strikes {
            warn!(
                pubkey,
                strike_count = record.count,
                window_secs = record.first_strike.elapsed().as_secs(),
                ban_duration = %humantime::format_duration(self.cfg.ban_duration),
                "auto-banning author for repeated violations"
            );
            self.ban_async(pubkey.clone());
            self.strikes.remove(pubkey);
            self.cooldown.add(pubkey.clone(), ());
        }
    }
}
