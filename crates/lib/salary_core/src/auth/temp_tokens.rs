//! Temporary token cache.
//!
//! Opaque, repeat-use tokens issued next to the session token at login, for
//! places where a bearer header cannot be sent (links, downloads). Entries
//! live in memory only and vanish on restart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use tracing::debug;

/// Default temporary token lifetime: 10 minutes.
pub const DEFAULT_TEMP_TOKEN_TTL: Duration = Duration::from_secs(600);

/// Longest accepted lifetime: one year. Larger values are clamped.
pub const MAX_TEMP_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Interval of the optional background sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const TOKEN_BYTES: usize = 24;

#[derive(Debug, Clone)]
struct CacheEntry {
    subject: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent token → (subject, expiry) map.
///
/// Expired entries are evicted lazily on lookup; [`purge_expired`] and
/// [`spawn_cleanup_task`] only bound memory.
///
/// [`purge_expired`]: TemporaryTokenCache::purge_expired
/// [`spawn_cleanup_task`]: TemporaryTokenCache::spawn_cleanup_task
#[derive(Debug)]
pub struct TemporaryTokenCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl TemporaryTokenCache {
    /// A zero `ttl` falls back to [`DEFAULT_TEMP_TOKEN_TTL`]; anything above
    /// [`MAX_TEMP_TOKEN_TTL`] is clamped to it.
    pub fn new(ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() {
            DEFAULT_TEMP_TOKEN_TTL
        } else {
            ttl.min(MAX_TEMP_TOKEN_TTL)
        };
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new token for `subject`.
    pub fn issue(&self, subject: &str) -> String {
        let token = random_token();
        let entry = CacheEntry {
            subject: subject.to_string(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.insert(token.clone(), entry);
        token
    }

    /// Subject of a live token. Does not consume the token.
    pub fn validate_and_get_subject(&self, token: &str) -> Option<String> {
        let now = Instant::now();
        match self.entries.get(token) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(entry.subject.clone()),
            Some(_) => {}
        }
        // The read guard is gone here; only remove if still expired so a
        // concurrent re-insert under the same key is left alone.
        if self
            .entries
            .remove_if(token, |_, entry| entry.is_expired(now))
            .is_some()
        {
            debug!("evicted expired temporary token");
        }
        None
    }

    /// Remove a token. Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) {
        self.entries.remove(token);
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a periodic purge task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                cache.purge_expired();
            }
        })
    }
}

impl Default for TemporaryTokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_TOKEN_TTL)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
