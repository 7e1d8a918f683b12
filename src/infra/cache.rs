//! Flat-file response cache with lazy TTL expiry.
//!
//! - SHA-256 keys over the parsed URL
//! - Layout: `{cache_dir}/{keyhex}.json`
//! - Atomic writes (temp + rename), last writer wins
//! - No eviction sweep; stale entries are simply reported as stale

use crate::error::ProxyError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// A stored upstream response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix seconds.
    pub stored_at: u64,
    pub status: u16,
    pub content_type: String,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

impl CacheEntry {
    pub fn new(status: u16, content_type: String, body: Vec<u8>) -> Self {
        Self {
            stored_at: unix_secs(SystemTime::now()),
            status,
            content_type,
            body,
            diagnostics: None,
        }
    }

    pub fn age_at(&self, now: SystemTime) -> Duration {
        Duration::from_secs(unix_secs(now).saturating_sub(self.stored_at))
    }
}

#[derive(Debug)]
pub enum CacheLookup {
    Fresh { entry: CacheEntry, age: Duration },
    /// Present but outside the TTL window. Callers treat it as absent.
    Stale { age: Duration },
    Absent,
}

/// Only responses in `[200, 400)` are written.
pub fn is_cacheable(status: u16) -> bool {
    (200..400).contains(&status)
}

pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lowercase hex SHA-256 of the URL serialization.
    pub fn key_for(url: &Url) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub async fn lookup(&self, key: &str) -> CacheLookup {
        self.lookup_at(key, SystemTime::now()).await
    }

    /// Reads the entry for `key` and classifies it against the TTL.
    ///
    /// # Arguments
    ///
    /// * `key` - Cache key from [`CacheStore::key_for`]
    /// * `now` - Reference time for the age calculation
    ///
    /// # Returns
    ///
    /// `Fresh` with the entry and its age, `Stale` with the age only, or
    /// `Absent` when the file is missing or unreadable. Stale files are left
    /// in place for the next write to replace.
    pub async fn lookup_at(&self, key: &str, now: SystemTime) -> CacheLookup {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(_) => return CacheLookup::Absent,
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Ignoring corrupt cache entry");
                return CacheLookup::Absent;
            }
        };

        let age = entry.age_at(now);
        if age < self.ttl {
            CacheLookup::Fresh { entry, age }
        } else {
            CacheLookup::Stale { age }
        }
    }

    /// Writes `entry` under `key`, replacing any previous entry.
    ///
    /// # Arguments
    ///
    /// * `key` - Cache key from [`CacheStore::key_for`]
    /// * `entry` - Status, content type, body and optional diagnostics
    ///
    /// # Returns
    ///
    /// `Ok(())` once the entry is renamed into place, or `CacheIo` if the
    /// directory, temp file or rename fails. Readers never see a partial
    /// file; concurrent writers resolve as last writer wins.
    ///
    /// Creates the cache directory on first use.
    pub async fn store(&self, key: &str, entry: &CacheEntry) -> Result<(), ProxyError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let payload = serde_json::to_vec(entry).map_err(std::io::Error::from)?;
        let target = self.entry_path(key);
        let temp = self
            .dir
            .join(format!("{}.{:016x}.tmp", key, fastrand::u64(..)));

        tokio::fs::write(&temp, &payload).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

mod base64_body {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
