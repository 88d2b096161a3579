//! Cache-aside reads of user profiles.
//!
//! Entries are populated lazily on a miss and deleted on every write to the
//! owning user; they are never updated in place. Invalidation is not
//! transactional with the write it follows, so a failed delete can leave a
//! stale entry until its TTL runs out.

use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::CacheClient;
use crate::{accounts::repo_types::Profile, error::AccountError};

pub const PROFILE_TTL: Duration = Duration::from_secs(168 * 60 * 60);

pub fn cache_key(user_id: i64) -> String {
    format!("users:{}", user_id)
}

#[derive(Clone)]
pub struct ProfileCache {
    client: Arc<dyn CacheClient>,
    deadline: Duration,
}

impl ProfileCache {
    pub fn new(client: Arc<dyn CacheClient>, deadline: Duration) -> Self {
        Self { client, deadline }
    }

    /// Returns the cached profile, or runs `fetch` against the source of truth
    /// and caches its result. A failing fetch is returned as-is and nothing is
    /// cached.
    pub async fn get_profile<F, Fut>(&self, user_id: i64, fetch: F) -> Result<Profile, AccountError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Profile, AccountError>>,
    {
        let key = cache_key(user_id);

        match timeout(self.deadline, self.client.get(&key)).await {
            Ok(Ok(Some(bytes))) => match serde_json::from_slice::<Profile>(&bytes) {
                Ok(profile) => {
                    debug!(user_id, "profile cache hit");
                    return Ok(profile);
                }
                Err(e) => warn!(user_id, error = %e, "undecodable cached profile; refetching"),
            },
            Ok(Ok(None)) => debug!(user_id, "profile cache miss"),
            Ok(Err(e)) => warn!(user_id, error = %e, "cache read failed; treating as miss"),
            Err(_) => warn!(user_id, "cache read timed out; treating as miss"),
        }

        let profile = fetch().await?;

        let bytes = serde_json::to_vec(&profile).context("serialize profile for cache")?;
        timeout(self.deadline, self.client.set(&key, bytes, PROFILE_TTL))
            .await
            .context("cache write timed out")?
            .context("cache write failed")?;

        Ok(profile)
    }

    /// Unconditionally drops the cached profile of `user_id`.
    pub async fn invalidate(&self, user_id: i64) -> anyhow::Result<()> {
        timeout(self.deadline, self.client.delete(&cache_key(user_id)))
            .await
            .context("cache delete timed out")??;
        debug!(user_id, "profile cache invalidated");
        Ok(())
    }
}
