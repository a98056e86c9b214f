//! Web search provider abstraction.
//!
//! The pipeline only needs one capability from a search provider: run a query and
//! return source records. Tavily is the primary implementation.

mod tavily;

pub use tavily::TavilyClient;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

/// Search topic classification understood by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTopic {
    #[default]
    General,
    News,
}

impl std::fmt::Display for SearchTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::News => write!(f, "news"),
        }
    }
}

impl std::str::FromStr for SearchTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "news" => Ok(Self::News),
            other => Err(format!("unknown search topic '{}'", other)),
        }
    }
}

/// How a research step should query the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMode {
    pub topic: SearchTopic,
    /// Recency window in days. Only sent for [`SearchTopic::News`].
    pub days: Option<u32>,
}

impl SearchMode {
    pub fn general() -> Self {
        Self {
            topic: SearchTopic::General,
            days: None,
        }
    }

    pub fn news(days: Option<u32>) -> Self {
        Self {
            topic: SearchTopic::News,
            days,
        }
    }

    /// The recency window to attach to a request, if any.
    pub fn effective_days(&self) -> Option<u32> {
        match self.topic {
            SearchTopic::News => self.days,
            SearchTopic::General => None,
        }
    }
}

impl Default for SearchMode {
    fn default() -> Self {
        Self::general()
    }
}

/// One search hit, deduplicated downstream by `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Most relevant snippet from the page.
    #[serde(default, rename = "content")]
    pub snippet: String,
    /// Long-form page body, when the provider returned it.
    #[serde(default)]
    pub raw_content: Option<String>,
}

impl SourceRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            raw_content: None,
        }
    }

    pub fn with_raw_content(mut self, raw: impl Into<String>) -> Self {
        self.raw_content = Some(raw.into());
        self
    }
}

/// Results of a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub query: Option<String>,
    /// Records that fail to decode or lack a URL are dropped individually.
    #[serde(default, deserialize_with = "skip_malformed_records")]
    pub results: Vec<SourceRecord>,
}

fn skip_malformed_records<'de, D>(deserializer: D) -> Result<Vec<SourceRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<SourceRecord>(value) {
            Ok(record) if !record.url.trim().is_empty() => Some(record),
            Ok(record) => {
                tracing::warn!("Skipping search result without a URL: {:?}", record.title);
                None
            }
            Err(e) => {
                tracing::warn!("Skipping malformed search result: {}", e);
                None
            }
        })
        .collect())
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A single search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub mode: SearchMode,
    pub include_raw_content: bool,
}

/// Error from a search provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Network(String),
    #[error("search provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to parse search response: {0}")]
    Parse(String),
    #[error("search exceeded deadline of {0:?}")]
    Timeout(std::time::Duration),
}

/// Trait for search providers.
///
/// Implementations must tolerate many concurrent calls.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError>;
}
