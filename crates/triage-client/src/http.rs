//! REST client for the console backend: search, bulk execute and the
//! operation catalog, each mapped onto the engine traits.

use crate::{ClientError, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use triage_core::config::ApiConfig;
use triage_core::execution::{ActionExecutor, BulkRequest};
use triage_core::operation::{Operation, OperationSource};
use triage_core::report::ActionReport;
use triage_core::search::{SearchBackend, SearchRequest, SearchResponse};

pub const SEARCH_PATH: &str = "/api/v1/search";
pub const EXECUTE_PATH: &str = "/api/v1/action/execute";
pub const OPERATIONS_PATH: &str = "/api/v1/action/operations";
pub const EVENTS_PATH: &str = "/api/v1/events";

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// REST client for the console backend.
///
/// The configured timeout applies to request/response calls only; the event
/// stream opened by [`HttpBackend::open_events`] stays open indefinitely.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            timeout,
        })
    }

    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        Self::new(&api.base_url, api.token.clone(), api.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self
            .request(Method::POST, path)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        decode(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .request(Method::GET, path)
            .timeout(self.timeout)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn search_items(&self, request: &SearchRequest) -> Result<SearchResponse> {
        tracing::debug!(query = %request.query, rows = request.rows, "search");
        self.post_json(SEARCH_PATH, request).await
    }

    pub async fn execute_bulk(&self, request: &BulkRequest) -> Result<ActionReport> {
        tracing::debug!(request_id = %request.request_id(), "bulk execute");
        self.post_json(EXECUTE_PATH, request).await
    }

    pub async fn fetch_operations(&self) -> Result<Vec<Operation>> {
        self.get_json(OPERATIONS_PATH).await
    }

    /// Open the server push stream. The caller reads the body line by line.
    pub async fn open_events(&self) -> Result<Response> {
        let resp = self
            .request(Method::GET, EVENTS_PATH)
            .header(reqwest::header::ACCEPT, "text/event-stream, application/x-ndjson")
            .send()
            .await?;
        check_status(resp).await
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

// ---------------------------------------------------------------------------
// Engine traits
// ---------------------------------------------------------------------------

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn search(&self, request: &SearchRequest) -> triage_core::Result<SearchResponse> {
        self.search_items(request)
            .await
            .map_err(ClientError::into_search)
    }
}

#[async_trait]
impl ActionExecutor for HttpBackend {
    async fn execute(&self, request: &BulkRequest) -> triage_core::Result<ActionReport> {
        self.execute_bulk(request)
            .await
            .map_err(ClientError::into_execution)
    }
}

#[async_trait]
impl OperationSource for HttpBackend {
    async fn operations(&self) -> triage_core::Result<Vec<Operation>> {
        self.fetch_operations()
            .await
            .map_err(ClientError::into_search)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
