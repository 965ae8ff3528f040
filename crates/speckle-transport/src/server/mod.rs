//! Transport backed by a collaboration server's object API.

pub mod wire;

use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use speckle_types::ObjectId;

use crate::error::{TransportError, TransportResult};
use crate::retry::RetryPolicy;
use crate::traits::Transport;
use wire::{ObjectIdsRequest, ObjectUpload};

/// Limits and batching for [`ServerTransport`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerTransportConfig {
    /// Upper bound on the serialized size of one upload request.
    pub max_request_bytes: usize,
    /// Records larger than this are refused before any request is made.
    pub max_object_bytes: usize,
    /// Ids per download request.
    pub download_batch: usize,
    /// Ids per presence-check request.
    pub diff_batch: usize,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for ServerTransportConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 25_000_000,
            max_object_bytes: 25_000_000,
            download_batch: 10_000,
            diff_batch: 100_000,
            timeout_secs: 60,
            retry: RetryPolicy::default(),
        }
    }
}

/// Reads and writes records of one stream on a remote server.
///
/// Uploads first ask the server which ids it already holds, so re-sending
/// after an interruption only transfers what is missing.
#[derive(Debug, Clone)]
pub struct ServerTransport {
    name: String,
    client: Client,
    base_url: String,
    stream_id: String,
    token: Option<String>,
    config: ServerTransportConfig,
}

impl ServerTransport {
    pub fn new(server_url: &str, stream_id: &str, token: Option<&str>) -> TransportResult<Self> {
        Self::with_config(server_url, stream_id, token, ServerTransportConfig::default())
    }

    pub fn with_config(
        server_url: &str,
        stream_id: &str,
        token: Option<&str>,
        config: ServerTransportConfig,
    ) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = server_url.trim_end_matches('/').to_string();
        Ok(Self {
            name: format!("server:{base_url}/{stream_id}"),
            client,
            base_url,
            stream_id: stream_id.to_string(),
            token: token.map(str::to_string),
            config,
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn config(&self) -> &ServerTransportConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Split records into upload requests no larger than `max_request_bytes`.
    /// A single record over the limit still gets a request of its own.
    fn plan_uploads<'a>(&self, records: &'a [(ObjectId, String)]) -> Vec<Vec<ObjectUpload<'a>>> {
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_bytes = 2usize;
        for (id, body) in records {
            // id hex, quotes, keys, and the escaping headroom of the body
            let cost = body.len() + body.len() / 8 + 96;
            if !current.is_empty() && current_bytes + cost > self.config.max_request_bytes {
                batches.push(std::mem::take(&mut current));
                current_bytes = 2;
            }
            current.push(ObjectUpload {
                id: *id,
                body: Cow::Borrowed(body.as_str()),
            });
            current_bytes += cost;
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn upload(&self, batch: &[ObjectUpload<'_>]) -> TransportResult<()> {
        let path = format!("/objects/{}", self.stream_id);
        self.config
            .retry
            .run("upload objects", || async {
                let response = self.request(Method::POST, &path).json(batch).send().await?;
                check(response).await.map(|_| ())
            })
            .await
    }

    async fn download(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, String>> {
        let path = format!("/api/getobjects/{}", self.stream_id);
        let payload = ObjectIdsRequest { objects: ids.to_vec() };
        let text = self
            .config
            .retry
            .run("download objects", || async {
                let response = self
                    .request(Method::POST, &path)
                    .header(ACCEPT, "text/plain")
                    .json(&payload)
                    .send()
                    .await?;
                Ok(check(response).await?.text().await?)
            })
            .await?;
        wire::parse_lines(&text)
    }

    async fn diff(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, bool>> {
        let path = format!("/api/diff/{}", self.stream_id);
        let payload = ObjectIdsRequest { objects: ids.to_vec() };
        self.config
            .retry
            .run("diff objects", || async {
                let response = self.request(Method::POST, &path).json(&payload).send().await?;
                Ok(check(response).await?.json::<HashMap<ObjectId, bool>>().await?)
            })
            .await
    }
}

/// Map a non-success status to [`TransportError::Http`].
async fn check(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(TransportError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Transport for ServerTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn save_object(&self, id: &ObjectId, body: &str) -> TransportResult<()> {
        self.save_objects(&[(*id, body.to_string())]).await
    }

    async fn save_objects(&self, records: &[(ObjectId, String)]) -> TransportResult<()> {
        if let Some((id, body)) = records
            .iter()
            .find(|(_, body)| body.len() > self.config.max_object_bytes)
        {
            return Err(TransportError::ObjectTooLarge {
                id: *id,
                size: body.len(),
                max: self.config.max_object_bytes,
            });
        }

        let ids: Vec<ObjectId> = records.iter().map(|(id, _)| *id).collect();
        let present = self.has_objects(&ids).await?;
        let missing: Vec<(ObjectId, String)> = records
            .iter()
            .filter(|(id, _)| !present.get(id).copied().unwrap_or(false))
            .cloned()
            .collect();
        if missing.is_empty() {
            debug!(stream = %self.stream_id, count = records.len(), "server already has every record");
            return Ok(());
        }

        let batches = self.plan_uploads(&missing);
        for batch in &batches {
            self.upload(batch).await?;
        }
        info!(
            stream = %self.stream_id,
            uploaded = missing.len(),
            skipped = records.len() - missing.len(),
            requests = batches.len(),
            "uploaded records"
        );
        Ok(())
    }

    async fn get_object(&self, id: &ObjectId) -> TransportResult<Option<String>> {
        let path = format!("/objects/{}/{}/single", self.stream_id, id);
        self.config
            .retry
            .run("get object", || async {
                let response = self.request(Method::GET, &path).send().await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                Ok(Some(check(response).await?.text().await?))
            })
            .await
    }

    async fn get_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, String>> {
        let mut found = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(self.config.download_batch.max(1)) {
            found.extend(self.download(batch).await?);
        }
        Ok(found)
    }

    async fn has_objects(&self, ids: &[ObjectId]) -> TransportResult<HashMap<ObjectId, bool>> {
        let mut present = HashMap::with_capacity(ids.len());
        for batch in ids.chunks(self.config.diff_batch.max(1)) {
            present.extend(self.diff(batch).await?);
        }
        Ok(present)
    }
}
