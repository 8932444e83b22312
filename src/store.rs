//! Persistent ban store.
//!
//! Keys are normalised to lowercase hex before every read or write;
//! the value is the record's expiry as unix seconds, since sled has no
//! per-key TTL of its own. Lapsed records are deleted lazily on read.

use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

const BAN_PREFIX: &str = "ban:";

/// Interface over the ban database, mockable in tests.
#[async_trait]
pub trait BanStore: Send + Sync {
    async fn is_author_banned(&self, pubkey: &str) -> Result<bool>;
    async fn ban_author(&self, pubkey: &str, duration: Duration) -> Result<()>;
    async fn unban_author(&self, pubkey: &str) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Production store backed by a sled tree.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("failed to open ban database at {}", path.display()))?;
        Ok(Self { db })
    }

    fn key(pubkey: &str) -> Vec<u8> {
        let mut key = BAN_PREFIX.as_bytes().to_vec();
        key.extend(pubkey.to_lowercase().into_bytes());
        key
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[async_trait]
impl BanStore for SledStore {
    async fn is_author_banned(&self, pubkey: &str) -> Result<bool> {
        let key = Self::key(pubkey);
        let Some(raw) = self.db.get(&key).context("ban lookup failed")? else {
            return Ok(false);
        };
        let expiry = raw
            .as_ref()
            .try_into()
            .map(u64::from_be_bytes)
            .unwrap_or(0);
        if expiry <= now_secs() {
            self.db.remove(&key).context("expired ban cleanup failed")?;
            return Ok(false);
        }
        Ok(true)
    }

    async fn ban_author(&self, pubkey: &str, duration: Duration) -> Result<()> {
        info!(pubkey, duration = %humantime::format_duration(duration), "banning author");
        let expiry = now_secs().saturating_add(duration.as_secs());
        self.db
            .insert(Self::key(pubkey), expiry.to_be_bytes().to_vec())
            .context("ban insert failed")?;
        Ok(())
    }

    async fn unban_author(&self, pubkey: &str) -> Result<()> {
        info!(pubkey, "unbanning author");
        self.db.remove(Self::key(pubkey)).context("ban removal failed")?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db.flush().context("failed to flush ban database")?;
        Ok(())
    }
}
