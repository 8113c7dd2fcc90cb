//! API client for the Manuel backend.
//!
//! Every authenticated call goes through the [`RequestExecutor`], which
//! supplies the bearer token and handles refresh and backoff. This module
//! only builds requests and maps HTTP responses into the error taxonomy.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{header, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{
    CostBreakdown, DownloadLink, ExportFormat, Manual, ManualList, QueryRequest, QueryResponse,
    Quotas, UploadManualRequest, UsageExport, UsageHistory, UsageStats, VoiceQueryRequest,
};
use crate::retry::{RequestExecutor, RequestOptions};

/// Default page size for usage history
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// Client for the Manuel REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    executor: Arc<RequestExecutor>,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(config: &Config, executor: Arc<RequestExecutor>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config.api_base_url()?, executor))
    }

    pub fn with_client(client: Client, base_url: &str, executor: Arc<RequestExecutor>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            executor,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts in-flight retry waits for every call on this client.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Parse a `Retry-After` header given in seconds
    fn retry_after(response: &Response) -> Option<Duration> {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Check if response is successful, returning a classified error if not.
    async fn check_response(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = Self::retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        Err(Error::from_status(status.as_u16(), &body, retry_after))
    }

    async fn send<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        debug!(method = %method, url = %url, "API request");

        self.executor
            .execute(options, &self.cancel, |token| {
                let mut request = self
                    .client
                    .request(method.clone(), &url)
                    .bearer_auth(token)
                    .header(header::ACCEPT, "application/json");
                if let Some(body) = body {
                    request = request.json(body);
                }
                async move {
                    let response = request.send().await.map_err(|e| Error::from_transport(&e))?;
                    let response = Self::check_response(response).await?;
                    let text = response.text().await.map_err(|e| Error::from_transport(&e))?;
                    // 204 and empty bodies decode as JSON null
                    let text = if text.trim().is_empty() { "null" } else { text.as_str() };
                    serde_json::from_str::<T>(text)
                        .map_err(|e| Error::Permanent(format!("Invalid response: {}", e)))
                }
            })
            .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send::<T, ()>(Method::GET, path, None, self.executor.general_options())
            .await
    }

    // ===== Manuals =====

    pub async fn list_manuals(&self) -> Result<Vec<Manual>> {
        let list: ManualList = self.get("/manuals").await?;
        Ok(list.manuals)
    }

    pub async fn upload_manual(
        &self,
        file_name: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<Manual> {
        if content.is_empty() {
            return Err(Error::Validation("Manual file is empty".to_string()));
        }
        let body = UploadManualRequest {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            content: STANDARD.encode(content),
        };
        self.send(Method::POST, "/manuals", Some(&body), self.executor.general_options())
            .await
    }

    pub async fn manual_download_link(&self, manual_id: &str) -> Result<DownloadLink> {
        self.get(&format!("/manuals/{}/download", manual_id)).await
    }

    /// Resolve the download link and fetch the file bytes. The link is
    /// pre-signed, so the second request carries no bearer token.
    pub async fn download_manual(&self, manual_id: &str) -> Result<Vec<u8>> {
        let link = self.manual_download_link(manual_id).await?;
        let response = self
            .client
            .get(&link.url)
            .send()
            .await
            .map_err(|e| Error::from_transport(&e))?;
        let response = Self::check_response(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::from_transport(&e))?;
        Ok(bytes.to_vec())
    }

    pub async fn delete_manual(&self, manual_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send::<_, ()>(
                Method::DELETE,
                &format!("/manuals/{}", manual_id),
                None,
                self.executor.general_options(),
            )
            .await?;
        Ok(())
    }

    // ===== Queries =====

    pub async fn ask(&self, question: &str, manual_id: Option<&str>) -> Result<QueryResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::Validation("Question is empty".to_string()));
        }
        let body = QueryRequest {
            question: question.to_string(),
            manual_id: manual_id.map(str::to_string),
        };
        self.send(
            Method::POST,
            "/query/text",
            Some(&body),
            self.executor.rate_limit_options(),
        )
        .await
    }

    pub async fn ask_voice(
        &self,
        audio: &[u8],
        content_type: &str,
        manual_id: Option<&str>,
    ) -> Result<QueryResponse> {
        if audio.is_empty() {
            return Err(Error::Validation("Recording is empty".to_string()));
        }
        let body = VoiceQueryRequest {
            audio: STANDARD.encode(audio),
            content_type: content_type.to_string(),
            manual_id: manual_id.map(str::to_string),
        };
        self.send(
            Method::POST,
            "/query/voice",
            Some(&body),
            self.executor.rate_limit_options(),
        )
        .await
    }

    // ===== Usage =====

    pub async fn usage_stats(&self) -> Result<UsageStats> {
        self.get("/usage/stats").await
    }

    pub async fn usage_history(&self, limit: u32) -> Result<UsageHistory> {
        self.get(&format!("/usage/history?limit={}", limit.max(1)))
            .await
    }

    pub async fn usage_costs(&self) -> Result<CostBreakdown> {
        self.get("/usage/costs").await
    }

    pub async fn usage_quotas(&self) -> Result<Quotas> {
        self.get("/usage/quotas").await
    }

    pub async fn export_usage(&self, format: ExportFormat) -> Result<UsageExport> {
        self.get(&format!("/usage/export?format={}", format)).await
    }
}
