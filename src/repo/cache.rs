/// File-backed time-to-live cache for upstream forecast documents
use crate::errors::ApiResult;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Persisted cache layout: one JSON object per key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub cached_at: DateTime<Utc>,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.cached_at < ttl
    }
}

pub struct ForecastCache {
    dir: PathBuf,
    seq: AtomicU64,
}

impl ForecastCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }

    /// Read an entry regardless of age. Missing or unreadable files are a miss.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("cache read failed for {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("discarding corrupt cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store a payload. The full document is written to a temp file first and
    /// then renamed over the old one, so readers never see a partial write.
    pub async fn write<T: Serialize>(
        &self,
        key: &str,
        payload: T,
        now: DateTime<Utc>,
    ) -> ApiResult<CacheEntry<T>> {
        let entry = CacheEntry {
            cached_at: now,
            payload,
        };
        let bytes = serde_json::to_vec(&entry)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp = path.with_extension(format!(
            "{}-{}.tmp",
            std::process::id(),
            self.seq.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());

        cache.write("kp_forecast", json!([1, 2, 3]), t0()).await.unwrap();
        let entry = cache.read::<serde_json::Value>("kp_forecast").await.unwrap();

        assert_eq!(entry.cached_at, t0());
        assert_eq!(entry.payload, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        cache.write("k", json!("v"), t0()).await.unwrap();

        let ttl = Duration::hours(1);
        let entry = cache.read::<serde_json::Value>("k").await.unwrap();
        assert!(entry.is_fresh(ttl, t0() + Duration::minutes(59)));
        assert!(!entry.is_fresh(ttl, t0() + Duration::minutes(61)));

        // Stale data is still reachable for fallback
        assert!(cache.read::<serde_json::Value>("k").await.is_some());
    }

    #[tokio::test]
    async fn test_missing_and_corrupt_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        assert!(cache.read::<serde_json::Value>("absent").await.is_none());

        tokio::fs::write(dir.path().join("broken.json"), b"{not json")
            .await
            .unwrap();
        assert!(cache.read::<serde_json::Value>("broken").await.is_none());
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        cache.write("a", json!(1), t0()).await.unwrap();
        cache.write("a", json!(2), t0()).await.unwrap();

        let mut names = Vec::new();
        let mut rd = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(e) = rd.next_entry().await.unwrap() {
            names.push(e.file_name().to_string_lossy().to_string());
        }
        assert_eq!(names, vec!["a.json".to_string()]);
        assert_eq!(
            cache.read::<serde_json::Value>("a").await.unwrap().payload,
            json!(2)
        );
    }

    #[tokio::test]
    async fn test_key_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ForecastCache::new(dir.path());
        cache.write("../escape/key", json!(1), t0()).await.unwrap();
        assert!(dir.path().join(".._escape_key.json").exists());
    }
}
