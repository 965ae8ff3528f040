use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use speckle_types::ObjectId;

use crate::error::TransportResult;
use crate::traits::Transport;

/// In-memory transport backed by a `HashMap`.
///
/// Counts write calls and stored records separately so tests can observe
/// deduplication.
pub struct MemoryTransport {
    name: String,
    objects: RwLock<HashMap<ObjectId, String>>,
    writes: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.read().contains_key(id)
    }

    pub fn all_ids(&self) -> Vec<ObjectId> {
        self.objects.read().keys().copied().collect()
    }

    /// Sum of stored body sizes in bytes.
    pub fn total_bytes(&self) -> usize {
        self.objects.read().values().map(String::len).sum()
    }

    /// Number of records that were newly stored (duplicates excluded).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Copy of every stored record.
    pub fn snapshot(&self) -> HashMap<ObjectId, String> {
        self.objects.read().clone()
    }

    pub fn clear(&self) {
        self.objects.write().clear();
    }

    fn insert(&self, id: &ObjectId, body: &str) {
        let mut objects = self.objects.write();
        if !objects.contains_key(id) {
            objects.insert(*id, body.to_string());
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("name", &self.name)
            .field("object_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save_object(&self, id: &ObjectId, body: &str) -> TransportResult<()> {
        self.insert(id, body);
        Ok(())
    }

    async fn save_objects(&self, records: &[(ObjectId, String)]) -> TransportResult<()> {
        for (id, body) in records {
            self.insert(id, body);
        }
        Ok(())
    }

    async fn get_object(&self, id: &ObjectId) -> TransportResult<Option<String>> {
        Ok(self.objects.read().get(id).cloned())
    }

    async fn get_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, String>> {
        let objects = self.objects.read();
        Ok(ids
            .iter()
            .filter_map(|id| objects.get(id).map(|body| (*id, body.clone())))
            .collect())
    }

    async fn has_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, bool>> {
        let objects = self.objects.read();
        Ok(ids.iter().map(|id| (*id, objects.contains_key(id))).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::TransportError;
    use speckle_types::CancellationToken;

    fn oid(byte: u8) -> ObjectId {
        ObjectId::from_hash([byte; 32])
    }

    fn body(children: &[(ObjectId, u64)], total: u64) -> String {
        let closure: Vec<String> = children
            .iter()
            .map(|(id, size)| format!("\"{id}\":{size}"))
            .collect();
        format!(
            "{{\"__closure\":{{{}}},\"speckle_type\":\"Node\",\"totalChildrenCount\":{total}}}",
            closure.join(",")
        )
    }

    /// root -> (a -> c), b
    async fn seeded() -> MemoryTransport {
        let store = MemoryTransport::named("source");
        store.save_object(&oid(3), &body(&[], 0)).await.unwrap();
        store.save_object(&oid(1), &body(&[(oid(3), 0)], 1)).await.unwrap();
        store.save_object(&oid(2), &body(&[], 0)).await.unwrap();
        store
            .save_object(&oid(9), &body(&[(oid(1), 1), (oid(2), 0)], 3))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn save_is_write_once() {
        let store = MemoryTransport::new();
        store.save_object(&oid(1), "first").await.unwrap();
        store.save_object(&oid(1), "second").await.unwrap();
        assert_eq!(store.get_object(&oid(1)).await.unwrap().as_deref(), Some("first"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn batch_lookups_report_presence() {
        let store = seeded().await;
        let found = store.get_objects(&[oid(1), oid(7)]).await.unwrap();
        assert_eq!(found.len(), 1);
        let present = store.has_objects(&[oid(1), oid(7)]).await.unwrap();
        assert_eq!(present[&oid(1)], true);
        assert_eq!(present[&oid(7)], false);
    }

    #[tokio::test]
    async fn copy_walks_the_whole_closure() {
        let source = seeded().await;
        let target = MemoryTransport::named("target");
        let calls = AtomicUsize::new(0);
        let progress = |_: usize, _: usize| {
            calls.fetch_add(1, Ordering::Relaxed);
        };
        let copied = source
            .copy_object_and_children(&oid(9), &target, &progress, None)
            .await
            .unwrap();
        assert_eq!(copied, 4);
        assert_eq!(target.len(), 4);
        assert_eq!(calls.load(Ordering::Relaxed), 3, "one report per level");
    }

    #[tokio::test]
    async fn copy_skips_records_the_target_has() {
        let source = seeded().await;
        let target = MemoryTransport::named("target");
        target.save_object(&oid(1), &body(&[(oid(3), 0)], 1)).await.unwrap();
        let copied = source
            .copy_object_and_children(&oid(9), &target, &|_, _| {}, None)
            .await
            .unwrap();
        assert_eq!(copied, 3);
        assert!(target.contains(&oid(3)), "children of present records are still walked");
    }

    #[tokio::test]
    async fn copy_reports_missing_records() {
        let source = seeded().await;
        let broken = MemoryTransport::new();
        broken.save_object(&oid(9), &source.get_object(&oid(9)).await.unwrap().unwrap()).await.unwrap();
        let target = MemoryTransport::new();
        let err = broken
            .copy_object_and_children(&oid(9), &target, &|_, _| {}, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn copy_honours_cancellation() {
        let source = seeded().await;
        let target = MemoryTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = source
            .copy_object_and_children(&oid(9), &target, &|_, _| {}, Some(&cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
        assert!(target.is_empty());
    }
}
