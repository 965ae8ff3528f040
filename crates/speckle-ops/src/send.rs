use std::sync::Arc;

use futures_util::future::join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use speckle_serializer::Record;
use speckle_transport::Transport;
use speckle_types::{CancellationToken, NodeRef, ObjectId};

use crate::error::{OpsError, OpsResult};
use crate::operations::{Operations, SendOptions, SendReport};
use crate::progress::{ProgressEvent, ProgressSink, Stage};

impl Operations {
    /// Flatten `root` and deliver its records to every transport.
    ///
    /// A batch counts as delivered once all transports acknowledge it. The
    /// root record goes out last, after everything it references, so a
    /// transport that holds the root holds its whole closure. Conversion
    /// cache entries are written only after full delivery.
    pub async fn send(
        &self,
        root: &NodeRef,
        transports: &[Arc<dyn Transport>],
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> OpsResult<SendReport> {
        if transports.is_empty() {
            return Err(OpsError::NoTransports);
        }
        if cancel.is_cancelled() {
            return Err(OpsError::Cancelled);
        }

        let (root_id, table) = self.flatten(root)?;
        let total = table.len();
        progress.report(ProgressEvent::new(Stage::Serialize, total, total));
        info!(
            root = %root_id,
            records = total,
            bytes = table.total_bytes(),
            cache_hits = table.stats().cache_hits,
            transports = transports.len(),
            "sending"
        );

        // The root is always the last record of the table.
        let (children, root_record) = table.records().split_at(total - 1);
        let mut delivered = deliver_batches(children, transports, &self.options, progress, cancel, total).await?;
        if cancel.is_cancelled() {
            return Err(OpsError::Cancelled);
        }
        delivered += deliver(transports, to_pairs(root_record)).await?;
        progress.report(ProgressEvent::new(Stage::Upload, delivered, total));

        if let (Some(cache), Some(scope)) = (&self.cache, &self.options.project) {
            for (application_id, reference) in table.cache_entries() {
                cache.set(scope, application_id, reference.clone());
            }
        }

        Ok(SendReport {
            root_id,
            total_records: total,
            cache_hits: table.stats().cache_hits,
            total_bytes: table.total_bytes(),
        })
    }
}

async fn deliver_batches(
    records: &[Record],
    transports: &[Arc<dyn Transport>],
    options: &SendOptions,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
    total: usize,
) -> OpsResult<usize> {
    let mut queue = records.chunks(options.batch_size.max(1)).map(to_pairs);
    let mut in_flight = FuturesUnordered::new();
    let mut delivered = 0usize;
    let mut failure = None;

    loop {
        while failure.is_none() && in_flight.len() < options.max_in_flight.max(1) && !cancel.is_cancelled() {
            match queue.next() {
                Some(batch) => in_flight.push(deliver(transports, batch)),
                None => break,
            }
        }
        match in_flight.next().await {
            Some(Ok(count)) => {
                delivered += count;
                progress.report(ProgressEvent::new(Stage::Upload, delivered, total));
            }
            // Stop handing out batches, but let the ones in flight finish.
            Some(Err(err)) => {
                if failure.is_none() {
                    failure = Some(err);
                }
            }
            None => break,
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(delivered),
    }
}

/// Save one batch on every transport concurrently.
///
/// Every transport's save runs to completion even when another one fails.
async fn deliver(transports: &[Arc<dyn Transport>], batch: Vec<(ObjectId, String)>) -> OpsResult<usize> {
    let results = join_all(transports.iter().map(|transport| transport.save_objects(&batch))).await;
    for result in results {
        result?;
    }
    debug!(records = batch.len(), transports = transports.len(), "batch delivered");
    Ok(batch.len())
}

fn to_pairs(records: &[Record]) -> Vec<(ObjectId, String)> {
    records
        .iter()
        .map(|record| (record.id, record.body.clone()))
        .collect()
}
