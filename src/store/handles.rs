use super::driver::{DocumentCollection, DocumentDriver};
use crate::core::Result;
use crate::datasource::DataSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Normalized identity of a physical collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleKey {
    pub connection: String,
    pub database: String,
    pub collection: String,
}

impl HandleKey {
    /// Connection strings compare case-insensitively and without trailing slashes.
    pub fn new(connection: &str, database: &str, collection: &str) -> Self {
        Self {
            connection: connection.trim().trim_end_matches('/').to_lowercase(),
            database: database.trim().to_string(),
            collection: collection.trim().to_string(),
        }
    }
}

/// Collection handles opened so far, shared by every clone of an adapter.
///
/// Lookups take a short read lock. First use of a key is serialized by a
/// per-key population mutex and re-checked under it, so each handle is opened
/// once and a slow open never holds up other collections.
#[derive(Default)]
pub struct CollectionHandleCache {
    handles: RwLock<HashMap<HandleKey, Arc<dyn DocumentCollection>>>,
    populating: StdMutex<HashMap<HandleKey, Arc<Mutex<()>>>>,
}

impl CollectionHandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &HandleKey) -> Result<Option<Arc<dyn DocumentCollection>>> {
        Ok(self.handles.read()?.get(key).cloned())
    }

    pub async fn get_or_open(
        &self,
        driver: &dyn DocumentDriver,
        source: &DataSource,
        collection: &str,
    ) -> Result<Arc<dyn DocumentCollection>> {
        let key = HandleKey::new(source.connection(), source.database(), collection);
        if let Some(handle) = self.get(&key)? {
            return Ok(handle);
        }

        let gate = self.population_gate(&key)?;
        let _populating = gate.lock().await;
        if let Some(handle) = self.get(&key)? {
            return Ok(handle);
        }

        let handle = driver
            .collection(source.connection(), source.database(), collection)
            .await?;
        self.handles.write()?.insert(key.clone(), Arc::clone(&handle));
        debug!(
            driver = driver.name(),
            database = %key.database,
            collection = %key.collection,
            "opened collection handle"
        );
        Ok(handle)
    }

    fn population_gate(&self, key: &HandleKey) -> Result<Arc<Mutex<()>>> {
        let mut gates = self.populating.lock()?;
        Ok(Arc::clone(gates.entry(key.clone()).or_default()))
    }

    pub fn len(&self) -> usize {
        self.handles.read().map(|handles| handles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StoreError, StoreResult};
    use crate::store::MemoryDriver;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            HandleKey::new(" MEM://Local/ ", "db", "articles"),
            HandleKey::new("mem://local", "db ", " articles")
        );
        assert_ne!(
            HandleKey::new("mem://local", "db", "Articles"),
            HandleKey::new("mem://local", "db", "articles")
        );
    }

    #[tokio::test]
    async fn test_handles_are_opened_once() {
        let driver = MemoryDriver::new();
        let cache = Arc::new(CollectionHandleCache::new());
        let source = DataSource::nosql("main", "mem://local", "news");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let driver = driver.clone();
            let source = source.clone();
            tasks.push(tokio::spawn(async move {
                cache.get_or_open(&driver, &source, "articles").await.unwrap()
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        assert_eq!(cache.len(), 1);
        assert!(handles.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(driver.opened_count(), 1);
    }

    /// Opens of the `slow` collection park until a permit is released.
    struct GatedDriver {
        inner: MemoryDriver,
        entered: Arc<Notify>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl DocumentDriver for GatedDriver {
        fn name(&self) -> &str {
            "gated"
        }

        async fn collection(
            &self,
            connection: &str,
            database: &str,
            collection: &str,
        ) -> StoreResult<Arc<dyn DocumentCollection>> {
            if collection == "slow" {
                self.entered.notify_one();
                let _permit = self
                    .release
                    .acquire()
                    .await
                    .map_err(|e| StoreError::Driver(e.to_string()))?;
            }
            self.inner.collection(connection, database, collection).await
        }
    }

    #[tokio::test]
    async fn test_slow_open_does_not_block_other_collections() {
        let driver = Arc::new(GatedDriver {
            inner: MemoryDriver::new(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        });
        let cache = Arc::new(CollectionHandleCache::new());
        let source = DataSource::nosql("main", "mem://local", "news");

        let slow = {
            let cache = Arc::clone(&cache);
            let driver = Arc::clone(&driver);
            let source = source.clone();
            tokio::spawn(async move {
                cache.get_or_open(driver.as_ref(), &source, "slow").await.map(|_| ())
            })
        };
        driver.entered.notified().await;

        let fast = tokio::time::timeout(
            Duration::from_secs(5),
            cache.get_or_open(driver.as_ref(), &source, "fast"),
        )
        .await;
        assert!(fast.is_ok(), "open of 'fast' waited on 'slow'");
        assert_eq!(cache.len(), 1);

        driver.release.add_permits(1);
        slow.await.unwrap().unwrap();
        assert_eq!(cache.len(), 2);
    }
}
