use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::debug;

use speckle_types::{CancellationToken, ObjectId};

use crate::error::{TransportError, TransportResult};
use crate::record::RecordHeader;

/// Progress callback for closure copies: `(records walked, records expected)`.
pub type CopyProgress<'a> = dyn Fn(usize, usize) + Send + Sync + 'a;

/// A store of content-addressed records.
///
/// # Invariants
///
/// - `save_object` with an id that is already present leaves the stored body
///   untouched. Bodies are never mutated after their first save.
/// - `get_object` returns exactly the bytes that were saved.
/// - Implementations are safe to share across tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short label used in logs and progress reports.
    fn name(&self) -> &str;

    /// Store one record.
    async fn save_object(&self, id: &ObjectId, body: &str) -> TransportResult<()>;

    /// Store a batch of records. Acknowledges only once all are durable.
    async fn save_objects(&self, records: &[(ObjectId, String)]) -> TransportResult<()> {
        for (id, body) in records {
            self.save_object(id, body).await?;
        }
        Ok(())
    }

    /// Fetch one record, `None` when absent.
    async fn get_object(&self, id: &ObjectId) -> TransportResult<Option<String>>;

    /// Fetch many records. Absent ids are simply missing from the result.
    async fn get_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, String>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(body) = self.get_object(id).await? {
                found.insert(*id, body);
            }
        }
        Ok(found)
    }

    /// Presence check for many ids.
    async fn has_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, bool>> {
        let found = self.get_objects(ids).await?;
        Ok(ids.iter().map(|id| (*id, found.contains_key(id))).collect())
    }

    /// Copy `id` and every record in its closure from `self` into `target`.
    ///
    /// The closure is walked level by level through each record's
    /// `__closure` keys. Records already in `target` are read from there
    /// instead of `self`, but their children are still visited, so an
    /// interrupted copy is completed by calling this again. Returns the
    /// number of records actually transferred.
    async fn copy_object_and_children(
        &self,
        id: &ObjectId,
        target: &dyn Transport,
        on_progress: &CopyProgress<'_>,
        cancel: Option<&CancellationToken>,
    ) -> TransportResult<usize> {
        let mut seen: HashSet<ObjectId> = HashSet::from([*id]);
        let mut frontier = vec![*id];
        let mut walked = 0usize;
        let mut transferred = 0usize;
        let mut expected = 1usize;

        while !frontier.is_empty() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(TransportError::Cancelled);
            }

            let mut bodies = target.get_objects(&frontier).await?;
            let missing: Vec<ObjectId> = frontier
                .iter()
                .filter(|id| !bodies.contains_key(id))
                .copied()
                .collect();

            if !missing.is_empty() {
                let fetched = self.get_objects(&missing).await?;
                if let Some(absent) = missing.iter().find(|id| !fetched.contains_key(id)) {
                    return Err(TransportError::NotFound(*absent));
                }
                let batch: Vec<(ObjectId, String)> = missing
                    .iter()
                    .filter_map(|id| fetched.get(id).map(|body| (*id, body.clone())))
                    .collect();
                target.save_objects(&batch).await?;
                transferred += batch.len();
                bodies.extend(fetched);
            }

            let mut next = Vec::new();
            for current in &frontier {
                let Some(body) = bodies.get(current) else {
                    return Err(TransportError::NotFound(*current));
                };
                let header = RecordHeader::parse(body)?;
                if current == id {
                    expected = header.total_children_count as usize + 1;
                }
                for child in header.child_ids() {
                    if seen.insert(*child) {
                        next.push(*child);
                    }
                }
            }

            walked += frontier.len();
            on_progress(walked, expected.max(walked));
            frontier = next;
        }

        debug!(
            source = self.name(),
            target = target.name(),
            root = %id.short_hex(),
            walked,
            transferred,
            "copied closure"
        );
        Ok(transferred)
    }
}
