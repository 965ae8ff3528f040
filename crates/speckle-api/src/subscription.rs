use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::{error_for_status, Client, GraphQlRequest, GraphQlResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{CommitCreatedEvent, StreamUpdatedEvent};
use crate::queries;

const CHANNEL_CAPACITY: usize = 64;

/// A live feed of server events.
///
/// One background task reads the server's event stream and broadcasts each
/// event; [`resubscribe`](Self::resubscribe) hands out more receivers of the
/// same feed. The task stops when the last handle is dropped, and
/// [`recv`](Self::recv) returns `None` once the server ends the stream.
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
    task: Arc<AbortOnDrop>,
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T: Clone> Subscription<T> {
    /// Next event. Events missed because this receiver fell behind are
    /// skipped with a warning.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber fell behind, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Another receiver on the same feed, starting from now.
    pub fn resubscribe(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            task: Arc::clone(&self.task),
        }
    }
}

impl Client {
    /// Events for metadata changes of one stream.
    pub async fn subscribe_stream_updated(&self, stream_id: &str) -> ApiResult<Subscription<StreamUpdatedEvent>> {
        self.subscribe(queries::STREAM_UPDATED, stream_id, "streamUpdated")
            .await
    }

    /// Events for every commit created on any branch of one stream.
    pub async fn subscribe_commit_created(&self, stream_id: &str) -> ApiResult<Subscription<CommitCreatedEvent>> {
        self.subscribe(queries::COMMIT_CREATED, stream_id, "commitCreated")
            .await
    }

    async fn subscribe<T>(
        &self,
        (operation, query): (&str, &str),
        stream_id: &str,
        field: &'static str,
    ) -> ApiResult<Subscription<T>>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        let request = GraphQlRequest {
            query: query.to_string(),
            variables: json!({ "streamId": stream_id }),
            operation_name: Some(operation.to_string()),
        };
        let response = self
            .streaming
            .post(self.endpoint("/graphql/stream"))
            .bearer_auth(&self.account.token)
            .header(ACCEPT, "text/event-stream")
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await?;
            return Err(error_for_status(status, &text));
        }

        debug!(operation, stream_id, "subscribed");
        let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(pump(response, sender, field));
        Ok(Subscription {
            receiver,
            task: Arc::new(AbortOnDrop(task)),
        })
    }
}

async fn pump<T: DeserializeOwned>(response: reqwest::Response, sender: broadcast::Sender<T>, field: &'static str) {
    let mut body = response.bytes_stream();
    let mut parser = SseParser::default();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, field, "subscription stream broke");
                return;
            }
        };
        for frame in parser.push(&chunk) {
            if frame.event.as_deref() == Some("complete") {
                debug!(field, "server completed subscription");
                return;
            }
            match decode_event::<T>(&frame.data, field) {
                Ok(event) => {
                    if sender.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, field, "dropping undecodable event"),
            }
        }
    }
}

/// Decode one `data:` payload: a GraphQL response whose `data` holds `field`.
fn decode_event<T: DeserializeOwned>(data: &str, field: &str) -> ApiResult<T> {
    let response: GraphQlResponse<JsonValue> =
        serde_json::from_str(data).map_err(|e| ApiError::Decode(e.to_string()))?;
    let mut data = response.into_result()?;
    let value = data
        .get_mut(field)
        .map(JsonValue::take)
        .ok_or(ApiError::MissingData)?;
    serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}

/// One server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental `text/event-stream` parser. Chunks may split frames, lines,
/// or UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&raw[..end]);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines = Vec::new();
    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (name, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match name {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }
    frame.data = data_lines.join("\n");
    if frame.event.is_none() && frame.data.is_empty() {
        return None;
    }
    Some(frame)
}
