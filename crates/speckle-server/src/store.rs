//! Per-stream object storage behind the REST endpoints.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info};

use speckle_transport::{DiskTransport, MemoryTransport, RecordHeader, Transport, TransportError};
use speckle_types::ObjectId;

use crate::error::{ServerError, ServerResult};

#[derive(Deserialize)]
struct RecordId {
    id: ObjectId,
}

/// One content-addressed store per stream, created on first use.
///
/// Streams never see each other's records, so a commit can only reference
/// objects uploaded to its own stream.
pub struct ObjectStore {
    data_dir: Option<PathBuf>,
    max_object_bytes: usize,
    streams: RwLock<HashMap<String, Arc<dyn Transport>>>,
}

impl ObjectStore {
    pub fn in_memory(max_object_bytes: usize) -> Self {
        Self {
            data_dir: None,
            max_object_bytes,
            streams: RwLock::new(HashMap::new()),
        }
    }

    pub fn on_disk(data_dir: impl Into<PathBuf>, max_object_bytes: usize) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::in_memory(max_object_bytes)
        }
    }

    fn stream(&self, stream_id: &str) -> ServerResult<Arc<dyn Transport>> {
        if let Some(store) = self.streams.read().get(stream_id) {
            return Ok(store.clone());
        }
        let mut streams = self.streams.write();
        if let Some(store) = streams.get(stream_id) {
            return Ok(store.clone());
        }
        let store: Arc<dyn Transport> = match &self.data_dir {
            Some(dir) => Arc::new(DiskTransport::open(dir.join(stream_id))?),
            None => Arc::new(MemoryTransport::named(stream_id)),
        };
        debug!(stream = stream_id, backend = store.name(), "opened object store");
        streams.insert(stream_id.to_string(), store.clone());
        Ok(store)
    }

    /// Validate and store an upload batch. Every body must be a JSON object
    /// whose `id` matches the id it was sent under.
    pub async fn save(&self, stream_id: &str, records: &[(ObjectId, String)]) -> ServerResult<usize> {
        for (id, body) in records {
            if body.len() > self.max_object_bytes {
                return Err(TransportError::ObjectTooLarge {
                    id: *id,
                    size: body.len(),
                    max: self.max_object_bytes,
                }
                .into());
            }
            let declared: RecordId = serde_json::from_str(body)
                .map_err(|e| ServerError::BadInput(format!("object {id} is not a record: {e}")))?;
            if declared.id != *id {
                return Err(ServerError::BadInput(format!(
                    "object uploaded as {id} declares id {}",
                    declared.id
                )));
            }
        }
        self.stream(stream_id)?.save_objects(records).await?;
        Ok(records.len())
    }

    pub async fn get(&self, stream_id: &str, id: &ObjectId) -> ServerResult<Option<String>> {
        Ok(self.stream(stream_id)?.get_object(id).await?)
    }

    pub async fn get_many(&self, stream_id: &str, ids: &[ObjectId]) -> ServerResult<HashMap<ObjectId, String>> {
        Ok(self.stream(stream_id)?.get_objects(ids).await?)
    }

    pub async fn has_many(&self, stream_id: &str, ids: &[ObjectId]) -> ServerResult<HashMap<ObjectId, bool>> {
        Ok(self.stream(stream_id)?.has_objects(ids).await?)
    }

    /// Header of a stored record, `None` when the stream does not hold it.
    pub async fn header(&self, stream_id: &str, id: &ObjectId) -> ServerResult<Option<RecordHeader>> {
        match self.get(stream_id, id).await? {
            Some(body) => Ok(Some(RecordHeader::parse(&body)?)),
            None => Ok(None),
        }
    }

    /// Drop a stream's objects.
    pub async fn remove(&self, stream_id: &str) -> ServerResult<()> {
        self.streams.write().remove(stream_id);
        if let Some(dir) = &self.data_dir {
            let path = dir.join(stream_id);
            if tokio::fs::try_exists(&path).await? {
                tokio::fs::remove_dir_all(&path).await?;
                info!(stream = stream_id, "removed stored objects");
            }
        }
        Ok(())
    }
}
