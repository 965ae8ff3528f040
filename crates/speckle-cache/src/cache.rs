use std::collections::HashMap;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::debug;

use speckle_types::{ObjectReference, ProjectScope};

/// `(project scope, application id)` pair identifying a cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: ProjectScope,
    pub application_id: String,
}

impl CacheKey {
    pub fn new(scope: &ProjectScope, application_id: &str) -> Self {
        Self {
            scope: scope.clone(),
            application_id: application_id.to_string(),
        }
    }
}

/// In-memory conversion cache shared between concurrent sends.
pub struct ConversionCache {
    entries: RwLock<HashMap<CacheKey, ObjectReference>>,
}

impl ConversionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn try_get(&self, scope: &ProjectScope, application_id: &str) -> Option<ObjectReference> {
        self.entries
            .read()
            .get(&CacheKey::new(scope, application_id))
            .cloned()
    }

    /// Store a reference, returning the entry it replaced.
    pub fn set(
        &self,
        scope: &ProjectScope,
        application_id: &str,
        reference: ObjectReference,
    ) -> Option<ObjectReference> {
        debug!(%scope, application_id, id = %reference.referenced_id, "caching conversion");
        self.entries
            .write()
            .insert(CacheKey::new(scope, application_id), reference)
    }

    /// Return the cached reference, computing and storing it if absent.
    ///
    /// `make` runs at most once per key even under contention; losers of the
    /// race observe the winner's entry.
    pub fn get_or_insert_with<F>(&self, scope: &ProjectScope, application_id: &str, make: F) -> ObjectReference
    where
        F: FnOnce() -> ObjectReference,
    {
        let key = CacheKey::new(scope, application_id);
        let guard = self.entries.upgradable_read();
        if let Some(existing) = guard.get(&key) {
            return existing.clone();
        }
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        guard.entry(key).or_insert_with(make).clone()
    }

    /// Remove every entry, in any scope, whose application id is listed.
    pub fn evict<S: AsRef<str>>(&self, application_ids: &[S]) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| {
            !application_ids
                .iter()
                .any(|id| id.as_ref() == key.application_id)
        });
        let removed = before - entries.len();
        debug!(removed, "evicted conversion cache entries");
        removed
    }

    /// Remove the listed application ids from one scope only.
    pub fn evict_in_scope<S: AsRef<str>>(&self, scope: &ProjectScope, application_ids: &[S]) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| {
            &key.scope != scope
                || !application_ids
                    .iter()
                    .any(|id| id.as_ref() == key.application_id)
        });
        before - entries.len()
    }

    /// Number of entries held for `scope`.
    pub fn scope_len(&self, scope: &ProjectScope) -> usize {
        self.entries
            .read()
            .keys()
            .filter(|key| &key.scope == scope)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for ConversionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionCache")
            .field("entry_count", &self.len())
            .finish()
    }
}
