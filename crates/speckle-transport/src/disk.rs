use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use speckle_types::ObjectId;

use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;

const OBJECTS_DIR: &str = "objects";
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Options for [`DiskTransport`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// zstd level for new records; `None` stores plain JSON.
    pub compression_level: Option<i32>,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            compression_level: Some(3),
        }
    }
}

/// Records stored as one file each under `<root>/objects/ab/cdef...`.
///
/// Writes go to a temp file in the shard directory and are renamed into
/// place, so a reader never sees a partial record. Compressed and plain
/// files can coexist; the format is sniffed on read.
#[derive(Debug)]
pub struct DiskTransport {
    name: String,
    inner: Arc<DiskInner>,
}

#[derive(Debug)]
struct DiskInner {
    root: PathBuf,
    config: DiskConfig,
}

impl DiskTransport {
    pub fn open(root: impl AsRef<Path>) -> TransportResult<Self> {
        Self::with_config(root, DiskConfig::default())
    }

    pub fn with_config(root: impl AsRef<Path>, config: DiskConfig) -> TransportResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        debug!(path = %root.display(), "opened disk transport");
        Ok(Self {
            name: format!("disk:{}", root.display()),
            inner: Arc::new(DiskInner { root, config }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Every id stored on disk.
    pub async fn all_ids(&self) -> TransportResult<Vec<ObjectId>> {
        let inner = Arc::clone(&self.inner);
        blocking(move || Ok(inner.all_ids())).await
    }

    pub async fn len(&self) -> TransportResult<usize> {
        Ok(self.all_ids().await?.len())
    }
}

impl DiskInner {
    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let (shard, rest) = id.shard();
        self.root.join(OBJECTS_DIR).join(shard).join(rest)
    }

    fn write(&self, id: &ObjectId, body: &str) -> TransportResult<bool> {
        let path = self.path_for(id);
        if path.exists() {
            return Ok(false);
        }
        let Some(dir) = path.parent() else {
            return Err(TransportError::Io(io::Error::other("record path has no parent")));
        };
        fs::create_dir_all(dir)?;

        let bytes = match self.config.compression_level {
            Some(level) => zstd::encode_all(body.as_bytes(), level)?,
            None => body.as_bytes().to_vec(),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| TransportError::Io(e.error))?;
        Ok(true)
    }

    fn read(&self, id: &ObjectId) -> TransportResult<Option<String>> {
        let bytes = match fs::read(self.path_for(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let bytes = if bytes.starts_with(&ZSTD_MAGIC) {
            zstd::decode_all(bytes.as_slice()).map_err(|e| TransportError::CorruptObject {
                id: *id,
                reason: e.to_string(),
            })?
        } else {
            bytes
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| TransportError::CorruptObject {
                id: *id,
                reason: e.to_string(),
            })
    }

    fn all_ids(&self) -> Vec<ObjectId> {
        WalkDir::new(self.root.join(OBJECTS_DIR))
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let shard = entry.path().parent()?.file_name()?.to_str()?.to_string();
                let rest = entry.file_name().to_str()?;
                ObjectId::from_hex(&format!("{shard}{rest}")).ok()
            })
            .collect()
    }
}

async fn blocking<T, F>(f: F) -> TransportResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> TransportResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Task(e.to_string()))?
}

#[async_trait]
impl Transport for DiskTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save_object(&self, id: &ObjectId, body: &str) -> TransportResult<()> {
        let inner = Arc::clone(&self.inner);
        let (id, body) = (*id, body.to_string());
        blocking(move || inner.write(&id, &body).map(|_| ())).await
    }

    async fn save_objects(&self, records: &[(ObjectId, String)]) -> TransportResult<()> {
        let inner = Arc::clone(&self.inner);
        let records = records.to_vec();
        let written = blocking(move || {
            let mut written = 0usize;
            for (id, body) in &records {
                if inner.write(id, body)? {
                    written += 1;
                }
            }
            Ok(written)
        })
        .await?;
        debug!(transport = %self.name, written, "saved records");
        Ok(())
    }

    async fn get_object(&self, id: &ObjectId) -> TransportResult<Option<String>> {
        let inner = Arc::clone(&self.inner);
        let id = *id;
        blocking(move || inner.read(&id)).await
    }

    async fn get_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, String>> {
        let inner = Arc::clone(&self.inner);
        let ids = ids.to_vec();
        blocking(move || {
            let mut found = HashMap::with_capacity(ids.len());
            for id in ids {
                match inner.read(&id) {
                    Ok(Some(body)) => {
                        found.insert(id, body);
                    }
                    Ok(None) => {}
                    Err(TransportError::CorruptObject { id, reason }) => {
                        warn!(id = %id.short_hex(), %reason, "skipping corrupt record");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(found)
        })
        .await
    }

    async fn has_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, bool>> {
        let inner = Arc::clone(&self.inner);
        let ids = ids.to_vec();
        blocking(move || {
            Ok(ids
                .into_iter()
                .map(|id| {
                    let present = inner.path_for(&id).exists();
                    (id, present)
                })
                .collect())
        })
        .await
    }
}
