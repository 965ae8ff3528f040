use std::collections::{HashMap, HashSet};

use tracing::info;

use speckle_serializer::Deserializer;
use speckle_transport::{RecordHeader, Transport, TransportError};
use speckle_types::{CancellationToken, NodeRef, ObjectId};

use crate::error::{OpsError, OpsResult};
use crate::operations::Operations;
use crate::progress::{ProgressEvent, ProgressSink, Stage};

impl Operations {
    /// Fetch the closure of `root_id` and rehydrate it.
    ///
    /// With a `local` transport, records are read from it first; whatever
    /// it lacks is copied over from `remote` before rehydration, so the
    /// next receive of the same root is served locally. Any unresolvable
    /// reference fails the whole receive.
    pub async fn receive(
        &self,
        root_id: &ObjectId,
        remote: &dyn Transport,
        local: Option<&dyn Transport>,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> OpsResult<NodeRef> {
        if cancel.is_cancelled() {
            return Err(OpsError::Cancelled);
        }

        let report = |done, total| progress.report(ProgressEvent::new(Stage::Download, done, total));
        let records = match local {
            Some(local) => {
                let copied = remote
                    .copy_object_and_children(root_id, local, &report, Some(cancel))
                    .await?;
                info!(root = %root_id, copied, local = local.name(), "local transport updated");
                load_closure(local, root_id, &|_, _| {}, cancel).await?
            }
            None => load_closure(remote, root_id, &report, cancel).await?,
        };

        let total = records.len();
        let root = Deserializer::new(&self.registry)
            .with_cancellation(cancel)
            .rehydrate(root_id, &records)?;
        progress.report(ProgressEvent::new(Stage::Deserialize, total, total));
        info!(root = %root_id, records = total, source = remote.name(), "received");
        Ok(root)
    }
}

/// Read every record reachable from `root_id`, one closure level per batch.
async fn load_closure(
    source: &dyn Transport,
    root_id: &ObjectId,
    report: &(dyn Fn(usize, usize) + Send + Sync),
    cancel: &CancellationToken,
) -> OpsResult<HashMap<ObjectId, String>> {
    let mut records = HashMap::new();
    let mut seen = HashSet::from([*root_id]);
    let mut frontier = vec![*root_id];
    let mut expected = 1usize;

    while !frontier.is_empty() {
        if cancel.is_cancelled() {
            return Err(OpsError::Cancelled);
        }
        let mut fetched = source.get_objects(&frontier).await?;
        let mut next = Vec::new();
        for id in &frontier {
            let body = fetched.remove(id).ok_or(TransportError::NotFound(*id))?;
            let header = RecordHeader::parse(&body)?;
            if id == root_id {
                expected = header.total_children_count as usize + 1;
            }
            next.extend(header.child_ids().filter(|child| seen.insert(**child)).copied());
            records.insert(*id, body);
        }
        report(records.len(), expected.max(records.len()));
        frontier = next;
    }
    Ok(records)
}
