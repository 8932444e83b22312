//! Persistent-ban lookups with caching and flight coalescing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::BannedAuthorConfig;
use crate::event::Event;
use crate::limiter::TtlCache;
use crate::nip;
use crate::policy::{Filter, Meta, Verdict};
use crate::store::BanStore;

const CACHE_SIZE: usize = 8192;
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

pub struct BannedAuthorFilter {
    store: Arc<dyn BanStore>,
    cache: TtlCache<String, bool>,
    /// One in-flight store lookup per key; latecomers wait on the lock
    /// and then hit the freshly filled cache.
    flights: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    cfg: BannedAuthorConfig,
}

impl BannedAuthorFilter {
    pub fn new(store: Arc<dyn BanStore>, cfg: &BannedAuthorConfig) -> Self {
        Self {
            store,
            cache: TtlCache::new(CACHE_SIZE, CACHE_TTL),
            flights: tokio::sync::Mutex::new(HashMap::new()),
            cfg: cfg.clone(),
        }
    }

    async fn is_banned(&self, pubkey: &str) -> Result<bool> {
        let key = pubkey.to_lowercase();
        if let Some(banned) = self.cache.get(&key) {
            return Ok(banned);
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = flight.lock().await;

        let result = match self.cache.get(&key) {
            Some(banned) => Ok(banned),
            None => match self.store.is_author_banned(&key).await {
                Ok(banned) => {
                    self.cache.add(key.clone(), banned);
                    Ok(banned)
                }
                Err(err) => Err(err),
            },
        };

        drop(guard);
        self.flights.lock().await.remove(&key);
        result
    }
}

#[async_trait]
impl Filter for BannedAuthorFilter {
    fn name(&self) -> &'static str {
        "BannedAuthorFilter"
    }

    async fn matches(&self, event: &Event, _meta: &mut Meta) -> Verdict {
        match self.is_banned(&event.pubkey).await {
            Err(source) => {
                return Verdict::Error {
                    reason: "internal_author_check_failed",
                    source,
                }
            }
            Ok(true) => return Verdict::reject("author_banned"),
            Ok(false) => {}
        }

        if self.cfg.check_nip26 && event.has_tag("delegation") {
            let delegator = match nip::validate_delegation(event) {
                Ok(delegator) => delegator,
                Err(_) => return Verdict::reject("invalid_delegation"),
            };
            if !delegator.is_empty() {
                match self.is_banned(&delegator).await {
                    Err(source) => {
                        return Verdict::Error {
                            reason: "internal_delegator_check_failed",
                            source,
                        }
                    }
                    Ok(true) => return Verdict::reject("delegator_banned"),
                    Ok(false) => {}
                }
            }
        }

        Verdict::accept("author_not_banned")
    }
}
