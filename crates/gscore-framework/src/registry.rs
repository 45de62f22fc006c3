//! Registry index of service verticals.
//!
//! The registry is the only way to obtain a [`Sv`]. It keeps exactly one
//! module per name for its whole lifetime: modules are disabled, never
//! removed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{SvError, SvResult};
use crate::sv::{SV_NAMESPACE, Sv, SvConfig};
use gscore_core::BoxedConfigStore;

#[derive(Default)]
struct RegistryInner {
    /// Modules in registration order.
    order: Vec<Arc<Sv>>,
    index: HashMap<String, usize>,
}

/// Name-keyed index of all modules.
pub struct SvRegistry {
    store: BoxedConfigStore,
    inner: RwLock<RegistryInner>,
    /// Serializes module creation so hydration runs once per name.
    create_lock: tokio::sync::Mutex<()>,
}

impl SvRegistry {
    /// Creates an empty registry persisting module policy to `store`.
    pub fn new(store: BoxedConfigStore) -> Self {
        Self {
            store,
            inner: RwLock::new(RegistryInner::default()),
            create_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &BoxedConfigStore {
        &self.store
    }

    /// Returns the module named `name`, creating it on first use.
    ///
    /// A new module takes its policy from the store when a record exists;
    /// otherwise `defaults` are persisted and used. Once a module exists,
    /// `defaults` are ignored.
    pub async fn get_or_create(&self, name: &str, defaults: SvConfig) -> SvResult<Arc<Sv>> {
        if let Some(sv) = self.get(name) {
            return Ok(sv);
        }

        let _guard = self.create_lock.lock().await;
        if let Some(sv) = self.get(name) {
            return Ok(sv);
        }

        info!(sv = %name, "Initializing module");
        let config = match self.store.get(SV_NAMESPACE, name).await? {
            Some(record) => {
                debug!(sv = %name, "Hydrating module policy from store");
                serde_json::from_value(record).map_err(|e| SvError::InvalidRecord {
                    name: name.to_string(),
                    reason: e.to_string(),
                })?
            }
            None => {
                let record = serde_json::to_value(&defaults).map_err(|e| {
                    SvError::InvalidRecord {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                self.store.set(SV_NAMESPACE, name, record).await?;
                defaults
            }
        };

        let mut inner = self.inner.write();
        let seq = inner.order.len();
        let sv = Arc::new(Sv::new(
            name.to_string(),
            seq,
            config,
            Arc::clone(&self.store),
        ));
        inner.order.push(Arc::clone(&sv));
        inner.index.insert(name.to_string(), seq);
        Ok(sv)
    }

    /// Returns the module named `name` if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<Sv>> {
        let inner = self.inner.read();
        inner
            .index
            .get(name)
            .map(|&idx| Arc::clone(&inner.order[idx]))
    }

    /// Snapshot of all modules, ordered by priority then registration order.
    ///
    /// Each module's priority is read once, so a concurrent `set` cannot
    /// reorder the snapshot while it is being sorted.
    pub fn list(&self) -> Vec<Arc<Sv>> {
        let mut modules = self.inner.read().order.clone();
        modules.sort_by_cached_key(|sv| (sv.priority(), sv.seq()));
        modules
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }
}

impl std::fmt::Debug for SvRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SvRegistry")
            .field("module_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::{Area, SvUpdate};
    use gscore_core::{ConfigStore, MemoryStore, StoreError};
    use serde_json::json;

    fn registry() -> (SvRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (SvRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_same_name_returns_same_module() {
        let (registry, _) = registry();
        let a = registry
            .get_or_create("dice", SvConfig::default().with_priority(1))
            .await
            .unwrap();
        let b = registry
            .get_or_create("dice", SvConfig::default().with_priority(9).with_area(Area::Group))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.priority(), 1);
        assert_eq!(b.config().area, Area::All);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_triggers_merge_across_handles() {
        let (registry, _) = registry();
        let a = registry.get_or_create("x", SvConfig::default()).await.unwrap();
        let b = registry.get_or_create("x", SvConfig::default()).await.unwrap();

        a.on_fullmatch("one", |_, _| async {});
        b.on_fullmatch("two", |_, _| async {});
        assert_eq!(a.triggers().len(), 2);
    }

    #[tokio::test]
    async fn test_defaults_are_persisted_on_creation() {
        let (registry, store) = registry();
        registry
            .get_or_create("help", SvConfig::default().with_permission(1))
            .await
            .unwrap();

        let stored = store.get(SV_NAMESPACE, "help").await.unwrap().unwrap();
        assert_eq!(stored["permission"], 1);
        assert_eq!(stored["area"], "ALL");
    }

    #[tokio::test]
    async fn test_policy_survives_fresh_registry() {
        let store = Arc::new(MemoryStore::new());
        {
            let registry = SvRegistry::new(store.clone());
            let sv = registry.get_or_create("dice", SvConfig::default()).await.unwrap();
            sv.set(SvUpdate::new().enabled(false)).await.unwrap();
        }

        let registry = SvRegistry::new(store.clone());
        let sv = registry
            .get_or_create("dice", SvConfig::default().with_enabled(true))
            .await
            .unwrap();
        assert!(!sv.is_enabled());
    }

    #[tokio::test]
    async fn test_list_orders_by_priority_then_registration() {
        let (registry, _) = registry();
        for (name, priority) in [("late", 5), ("early", 1), ("tie", 5)] {
            registry
                .get_or_create(name, SvConfig::default().with_priority(priority))
                .await
                .unwrap();
        }

        let names: Vec<_> = registry
            .list()
            .iter()
            .map(|sv| sv.name().to_string())
            .collect();
        assert_eq!(names, vec!["early", "late", "tie"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_list_while_priorities_change() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let mut modules = Vec::new();
        for i in 0..64 {
            let config = SvConfig::default().with_priority(i % 7);
            modules.push(registry.get_or_create(&format!("sv{i}"), config).await.unwrap());
        }

        let shuffler = tokio::spawn(async move {
            for round in 0..20 {
                for (i, sv) in modules.iter().enumerate() {
                    let priority = ((i + round) % 7) as i32;
                    sv.set(SvUpdate::new().priority(priority)).await.unwrap();
                }
            }
        });
        while !shuffler.is_finished() {
            assert_eq!(registry.list().len(), 64);
            tokio::task::yield_now().await;
        }
        shuffler.await.unwrap();

        let priorities: Vec<i32> = registry.list().iter().map(|sv| sv.priority()).collect();
        assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_concurrent_creation_yields_one_module() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry
                        .get_or_create("shared", SvConfig::default().with_priority(i))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut modules = Vec::new();
        for handle in handles {
            modules.push(handle.await.unwrap());
        }
        assert!(modules.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_reported() {
        let (registry, store) = registry();
        store
            .set(SV_NAMESPACE, "broken", json!({"priority": "high"}))
            .await
            .unwrap();

        let err = registry
            .get_or_create("broken", SvConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SvError::InvalidRecord { .. }));
        assert!(registry.get("broken").is_none());
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl ConfigStore for DownStore {
        async fn get(
            &self,
            _namespace: &str,
            _key: &str,
        ) -> gscore_core::StoreResult<Option<serde_json::Value>> {
            Err(StoreError::Unavailable("offline".into()))
        }

        async fn set(
            &self,
            _namespace: &str,
            _key: &str,
            _value: serde_json::Value,
        ) -> gscore_core::StoreResult<()> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_unavailable_store_creates_nothing() {
        let registry = SvRegistry::new(Arc::new(DownStore));
        let err = registry
            .get_or_create("any", SvConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SvError::Storage(StoreError::Unavailable(_))));
        assert!(registry.is_empty());
    }
}
