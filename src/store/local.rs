//! Single-slot durable cache for a route the remote store has not confirmed.
//!
//! Every operation swallows its own failures: callers see a no-op, the
//! failure goes to the log.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::CacheError;
use crate::types::pending::PendingRoute;
use crate::types::route::LocationSample;

pub const PENDING_ROUTE_KEY: &str = "trilhos_pending_route";

/// String key/value storage the cache is persisted to.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// One JSON file per key inside a directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

/// Runs file I/O called from async code. On a multi-thread runtime the
/// worker hands its other tasks off first; elsewhere it runs inline.
fn blocking<T>(io: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(io)
        }
        _ => io(),
    }
}

impl CacheBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        blocking(|| -> Result<Option<String>, CacheError> {
            match std::fs::read_to_string(self.path(key)) {
                Ok(contents) => Ok(Some(contents)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        blocking(|| -> Result<(), CacheError> {
            std::fs::create_dir_all(&self.dir)?;
            let tmp = self.dir.join(format!("{}.json.tmp", key));
            std::fs::write(&tmp, value)?;
            std::fs::rename(&tmp, self.path(key))?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        blocking(|| -> Result<(), CacheError> {
            match std::fs::remove_file(self.path(key)) {
                Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
                _ => Ok(()),
            }
        })
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Handle to the pending-route slot. Without a backend every call is a
/// no-op and `load` returns `None`.
#[derive(Clone, Default)]
pub struct LocalCache {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl LocalCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// File-backed cache in `dir`, or a disabled one when `dir` is `None`.
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => Self::new(Arc::new(FileBackend::new(dir))),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn save(&self, route: &PendingRoute) {
        let Some(backend) = &self.backend else {
            return;
        };
        let result = serde_json::to_string(route)
            .map_err(CacheError::from)
            .and_then(|json| backend.set(PENDING_ROUTE_KEY, &json));
        if let Err(err) = result {
            tracing::error!("Failed to save pending route: {}", err);
        }
    }

    pub fn load(&self) -> Option<PendingRoute> {
        let backend = self.backend.as_ref()?;
        let result = backend.get(PENDING_ROUTE_KEY).and_then(|stored| {
            stored
                .map(|json| serde_json::from_str::<PendingRoute>(&json))
                .transpose()
                .map_err(CacheError::from)
        });
        match result {
            Ok(pending) => pending,
            Err(err) => {
                tracing::error!("Failed to read pending route: {}", err);
                None
            }
        }
    }

    pub fn clear(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        if let Err(err) = backend.remove(PENDING_ROUTE_KEY) {
            tracing::error!("Failed to clear pending route: {}", err);
        }
    }

    /// Replaces the cached points and flags the record for sync. Does
    /// nothing when the slot is empty.
    pub fn update_points(&self, points: &[LocationSample]) {
        let Some(pending) = self.load() else {
            return;
        };
        self.save(&PendingRoute {
            points: points.to_vec(),
            needs_sync: true,
            ..pending
        });
    }

    pub fn has_pending_sync(&self) -> bool {
        self.load().is_some_and(|pending| pending.needs_sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FullDisk;

    impl CacheBackend for FullDisk {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(Some("{not json".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded").into())
        }

        fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    fn pending(points: usize) -> PendingRoute {
        PendingRoute {
            route_id: None,
            points: (0..points)
                .map(|i| LocationSample::at(0.0, i as f64 * 0.001, i as i64 * 1000))
                .collect(),
            name: "Route - Jan 1, 09:00 AM".to_string(),
            started_at: 0,
            needs_sync: true,
        }
    }

    #[test]
    fn save_overwrites_the_single_slot() {
        let cache = LocalCache::in_memory();
        cache.save(&pending(1));
        cache.save(&pending(3));
        assert_eq!(cache.load().map(|p| p.points.len()), Some(3));
        cache.clear();
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn update_points_requires_existing_record() {
        let cache = LocalCache::in_memory();
        cache.update_points(&pending(2).points);
        assert_eq!(cache.load(), None);

        cache.save(&PendingRoute {
            needs_sync: false,
            ..pending(1)
        });
        cache.update_points(&pending(4).points);
        let stored = cache.load().expect("pending");
        assert_eq!(stored.points.len(), 4);
        assert!(stored.needs_sync);
        assert!(cache.has_pending_sync());
    }

    #[test]
    fn disabled_cache_is_inert() {
        let cache = LocalCache::disabled();
        cache.save(&pending(1));
        assert!(!cache.is_enabled());
        assert_eq!(cache.load(), None);
        assert!(!cache.has_pending_sync());
    }

    #[test]
    fn backend_failures_are_swallowed() {
        let cache = LocalCache::new(Arc::new(FullDisk));
        cache.save(&pending(1));
        cache.clear();
        cache.update_points(&[]);
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn file_backend_persists_camel_case_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = LocalCache::from_dir(Some(dir.path().to_path_buf()));
        cache.save(&pending(2));

        let raw = std::fs::read_to_string(dir.path().join("trilhos_pending_route.json"))
            .expect("cache file");
        assert!(raw.contains("\"needsSync\":true"));
        assert!(raw.contains("\"startedAt\":0"));

        let reopened = LocalCache::from_dir(Some(dir.path().to_path_buf()));
        assert_eq!(reopened.load(), Some(pending(2)));
        reopened.clear();
        reopened.clear();
        assert_eq!(cache.load(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_backend_runs_on_a_multi_thread_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = LocalCache::from_dir(Some(dir.path().join("nested")));

        cache.save(&pending(3));
        let loaded = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load() }
        })
        .await
        .expect("join");
        assert_eq!(loaded, Some(pending(3)));

        cache.clear();
        assert!(!dir.path().join("nested").join("trilhos_pending_route.json").exists());
    }

    #[tokio::test]
    async fn file_backend_runs_on_a_current_thread_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = LocalCache::from_dir(Some(dir.path().to_path_buf()));
        cache.save(&pending(1));
        assert_eq!(cache.load(), Some(pending(1)));
    }
}
