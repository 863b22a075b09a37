//! In-memory object backend for tests and local smoke runs.

use dashmap::DashMap;
use remcache_core::Result;

use crate::backend::{Object, ObjectBackend};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: DashMap<String, Object>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Inserts an object directly, bypassing the backend trait. Test seam.
    pub fn insert(&self, key: impl Into<String>, object: Object) {
        self.objects.insert(key.into(), object);
    }
}

#[async_trait::async_trait]
impl ObjectBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Object>> {
        Ok(self.objects.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, object: Object) -> Result<()> {
        self.objects.insert(key.to_string(), object);
        Ok(())
    }
}
