//! PocketBase REST client implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ApiResponse, ListParams, Record, RecordApi, RecordPage};
use crate::error::{ApiError, Result};

/// Default PocketBase address for local development
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8090";

/// PocketBase record API client
pub struct PocketBaseClient {
    http: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl PocketBaseClient {
    /// Create a new client against `base_url`
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn records_path(&self, collection: &str) -> String {
        format!("{}/api/collections/{}/records", self.base_url, collection)
    }

    fn record_path(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.records_path(collection), id)
    }

    /// Send a request and return the raw response on success
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.request(method, url).query(query);
        if let Some(ref token) = self.token {
            request = request.header("Authorization", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::from)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<T> {
        let response = self.send(method, url, query, body).await?;
        let data = response.json::<T>().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response: {}", e))
        })?;
        Ok(data)
    }
}

/// Map non-success statuses to `ApiError`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    let err = match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden,
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimit(Duration::from_secs(60)),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ApiError::BadRequest(message),
        status if status.is_server_error() => ApiError::ServerError(message),
        status => ApiError::InvalidResponse(format!("Unexpected status code: {}", status)),
    };
    Err(err.into())
}

#[async_trait]
impl RecordApi for PocketBaseClient {
    async fn list(
        &self,
        collection: &str,
        params: &ListParams,
    ) -> Result<ApiResponse<RecordPage>> {
        let url = self.records_path(collection);
        let page: RecordPage = self
            .send_json(Method::GET, &url, &params.to_query(), None)
            .await?;
        Ok(ApiResponse::fresh(page))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<ApiResponse<Record>> {
        let url = self.record_path(collection, id);
        let record: Record = self.send_json(Method::GET, &url, &[], None).await?;
        Ok(ApiResponse::fresh(record))
    }

    async fn create(&self, collection: &str, body: &Value) -> Result<ApiResponse<Record>> {
        let url = self.records_path(collection);
        let record: Record = self.send_json(Method::POST, &url, &[], Some(body)).await?;
        Ok(ApiResponse::fresh(record))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        body: &Value,
    ) -> Result<ApiResponse<Record>> {
        let url = self.record_path(collection, id);
        let record: Record = self
            .send_json(Method::PATCH, &url, &[], Some(body))
            .await?;
        Ok(ApiResponse::fresh(record))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<ApiResponse<()>> {
        let url = self.record_path(collection, id);
        self.send(Method::DELETE, &url, &[], None).await?;
        Ok(ApiResponse::fresh(()))
    }
}
