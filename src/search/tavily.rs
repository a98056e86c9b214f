//! Tavily search API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{SearchClient, SearchError, SearchRequest, SearchResponse, SearchTopic};

const TAVILY_API_URL: &str = "https://api.tavily.com/search";

/// Stateless Tavily client, safe to share across tasks.
pub struct TavilyClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TavilyClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build tuned HTTP client, using defaults: {}", e);
                Client::new()
            });
        Self {
            client,
            api_key,
            base_url: TAVILY_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SearchClient for TavilyClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let body = TavilyRequest::from(request);

        tracing::debug!(
            "Tavily search: query={:?}, topic={}, days={:?}",
            request.query,
            body.topic,
            body.days
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Network(format!("Request timeout: {}", e))
                } else {
                    SearchError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SearchError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| SearchError::Parse(e.to_string()))
    }
}

/// Tavily request body.
#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: u32,
    topic: SearchTopic,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
    include_raw_content: bool,
}

impl<'a> From<&'a SearchRequest> for TavilyRequest<'a> {
    fn from(request: &'a SearchRequest) -> Self {
        Self {
            query: &request.query,
            max_results: request.max_results,
            topic: request.mode.topic,
            days: request.mode.effective_days(),
            include_raw_content: request.include_raw_content,
        }
    }
}
