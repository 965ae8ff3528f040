use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::account::Account;
use crate::error::{ApiError, ApiResult, GraphQlError};

/// Body of a GraphQL HTTP request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default)]
    pub variables: JsonValue,
    #[serde(default)]
    pub operation_name: Option<String>,
}

/// Body of a GraphQL HTTP response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

impl<T> GraphQlResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<GraphQlError>) -> Self {
        Self { data: None, errors }
    }

    /// Errors win over data, even when both are present.
    pub fn into_result(self) -> ApiResult<T> {
        if !self.errors.is_empty() {
            return Err(ApiError::Graphql(self.errors));
        }
        self.data.ok_or(ApiError::MissingData)
    }
}

/// GraphQL client bound to one account.
///
/// Every method is a single request. Errors reported by the server are
/// returned as [`ApiError::Graphql`] with their payload intact; retrying is
/// left to the caller.
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) http: reqwest::Client,
    /// No overall timeout: subscription responses stay open indefinitely.
    pub(crate) streaming: reqwest::Client,
    pub(crate) account: Account,
}

impl Client {
    pub fn new(account: Account) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let streaming = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            streaming,
            account,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.account.server_url, path)
    }

    /// Run one operation and decode its whole `data` object.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        (operation, query): (&str, &str),
        variables: JsonValue,
    ) -> ApiResult<T> {
        debug!(operation, server = %self.account.server_url, "graphql request");
        let request = GraphQlRequest {
            query: query.to_string(),
            variables,
            operation_name: Some(operation.to_string()),
        };
        let response = self
            .http
            .post(self.endpoint("/graphql"))
            .bearer_auth(&self.account.token)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        decode_response(status, &text)
    }

    /// Run one operation and decode the value found at `path` inside `data`.
    pub(crate) async fn execute_at<T: DeserializeOwned>(
        &self,
        operation: (&str, &str),
        variables: JsonValue,
        path: &[&str],
    ) -> ApiResult<T> {
        let mut data: JsonValue = self.execute(operation, variables).await?;
        for key in path {
            data = match data.get_mut(*key).map(JsonValue::take) {
                Some(JsonValue::Null) | None => return Err(ApiError::MissingData),
                Some(value) => value,
            };
        }
        serde_json::from_value(data).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Error for a non-success response. Some servers pair GraphQL errors with
/// a 4xx status; those keep their payload.
pub(crate) fn error_for_status(status: StatusCode, text: &str) -> ApiError {
    if let Ok(body) = serde_json::from_str::<GraphQlResponse<JsonValue>>(text) {
        if !body.errors.is_empty() {
            return ApiError::Graphql(body.errors);
        }
    }
    ApiError::Http {
        status: status.as_u16(),
        message: text.to_string(),
    }
}

fn decode_response<T: DeserializeOwned>(status: StatusCode, text: &str) -> ApiResult<T> {
    if !status.is_success() {
        return Err(error_for_status(status, text));
    }
    serde_json::from_str::<GraphQlResponse<T>>(text)
        .map_err(|e| ApiError::Decode(e.to_string()))?
        .into_result()
}
