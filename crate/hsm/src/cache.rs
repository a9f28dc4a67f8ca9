use std::{num::NonZeroUsize, sync::Mutex};

use lru::LruCache;
use pkcs11_sys::{CK_OBJECT_CLASS, CK_OBJECT_HANDLE};

use crate::{HResult, HsmError};

const CACHE_CAPACITY: usize = 100;

/// LRU cache of (class, label) to object handle.
///
/// Object lookups walk the whole token; resolving the same label on every
/// request would dominate the hot path, so handles found once are reused
/// until evicted or explicitly forgotten (e.g. after a destroy).
pub struct ObjectHandlesCache(Mutex<LruCache<(CK_OBJECT_CLASS, Vec<u8>), CK_OBJECT_HANDLE>>);

impl Default for ObjectHandlesCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectHandlesCache {
    #[must_use]
    pub fn new() -> Self {
        let max = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self(Mutex::new(LruCache::new(max)))
    }

    pub fn get(&self, class: CK_OBJECT_CLASS, label: &[u8]) -> HResult<Option<CK_OBJECT_HANDLE>> {
        Ok(self
            .0
            .lock()
            .map_err(|_| HsmError::Default("failed to lock the handles cache".to_owned()))?
            .get(&(class, label.to_vec()))
            .copied())
    }

    pub fn insert(
        &self,
        class: CK_OBJECT_CLASS,
        label: Vec<u8>,
        handle: CK_OBJECT_HANDLE,
    ) -> HResult<()> {
        self.0
            .lock()
            .map_err(|_| HsmError::Default("failed to lock the handles cache".to_owned()))?
            .put((class, label), handle);
        Ok(())
    }

    pub fn remove(&self, class: CK_OBJECT_CLASS, label: &[u8]) -> HResult<()> {
        self.0
            .lock()
            .map_err(|_| HsmError::Default("failed to lock the handles cache".to_owned()))?
            .pop(&(class, label.to_vec()));
        Ok(())
    }

    pub fn clear(&self) -> HResult<()> {
        self.0
            .lock()
            .map_err(|_| HsmError::Default("failed to lock the handles cache".to_owned()))?
            .clear();
        Ok(())
    }
}
