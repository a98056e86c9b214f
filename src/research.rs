//! Research unit: topic → search queries → concurrent searches → formatted context.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{ChatMessage, StructuredInvoker, StructuredOutput};
use crate::prompts;
use crate::search::{SearchClient, SearchError, SearchMode, SearchRequest, SearchResponse};
use crate::sources::deduplicate_and_format_sources;

/// Which instruction template to use when asking for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryPurpose {
    /// Topic-wide queries used to plan the outline.
    Discovery,
    /// Queries scoped to one section.
    Detail,
}

/// Search queries produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Queries {
    /// List of search queries.
    pub queries: Vec<String>,
}

impl StructuredOutput for Queries {
    fn is_usable(&self) -> bool {
        self.queries.iter().any(|q| !q.trim().is_empty())
    }
}

/// Input of one research run.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub topic: String,
    /// Report organization, only used by discovery research.
    pub report_organization: Option<String>,
    pub purpose: QueryPurpose,
    pub number_of_queries: usize,
    pub tokens_per_source: usize,
}

/// Output of one research run.
#[derive(Debug, Clone, Default)]
pub struct ResearchOutcome {
    /// Queries that were actually executed.
    pub queries: Vec<String>,
    /// Formatted, deduplicated source context.
    pub context: String,
    /// Number of queries whose search call failed and contributed nothing.
    pub failed_searches: usize,
}

/// Provider-facing knobs shared by every research run.
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub mode: SearchMode,
    pub max_results: u32,
    pub include_raw_content: bool,
    /// Deadline applied to each individual search call.
    pub call_timeout: Option<Duration>,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            mode: SearchMode::general(),
            max_results: 5,
            include_raw_content: true,
            call_timeout: None,
        }
    }
}

/// Runs query generation and search. Cheap to clone; clients are shared.
#[derive(Clone)]
pub struct Researcher {
    invoker: StructuredInvoker,
    search: Arc<dyn SearchClient>,
    settings: ResearchSettings,
}

impl Researcher {
    pub fn new(
        invoker: StructuredInvoker,
        search: Arc<dyn SearchClient>,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            invoker,
            search,
            settings,
        }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Ask the model for search queries. Exhaustion is propagated.
    pub async fn plan_queries(&self, request: &ResearchRequest) -> Result<Vec<String>> {
        let instructions = match request.purpose {
            QueryPurpose::Discovery => prompts::discovery_query_instructions(
                &request.topic,
                request.report_organization.as_deref().unwrap_or(""),
                request.number_of_queries,
            ),
            QueryPurpose::Detail => {
                prompts::detail_query_instructions(&request.topic, request.number_of_queries)
            }
        };
        let human = match request.purpose {
            QueryPurpose::Discovery => prompts::QUERY_REQUEST,
            QueryPurpose::Detail => prompts::SECTION_QUERY_REQUEST,
        };
        let messages = [ChatMessage::system(instructions), ChatMessage::user(human)];

        let planned: Queries = self.invoker.invoke(&messages).await?;
        let queries: Vec<String> = planned
            .queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(request.number_of_queries.max(1))
            .collect();

        tracing::debug!("Planned {} {:?} queries: {:?}", queries.len(), request.purpose, queries);
        Ok(queries)
    }

    /// Run every query concurrently. Results line up with `queries` by index;
    /// a failed query yields an empty response in its slot.
    pub async fn search_all(&self, queries: &[String]) -> (Vec<SearchResponse>, usize) {
        let tasks = queries.iter().map(|query| async move {
            match self.search_one(query).await {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!("Search for {:?} failed, continuing without it: {}", query, e);
                    None
                }
            }
        });

        let results = join_all(tasks).await;
        let failed = results.iter().filter(|r| r.is_none()).count();
        let responses = results
            .into_iter()
            .map(|r| r.unwrap_or_else(SearchResponse::empty))
            .collect();
        (responses, failed)
    }

    async fn search_one(&self, query: &str) -> std::result::Result<SearchResponse, SearchError> {
        let request = SearchRequest {
            query: query.to_string(),
            max_results: self.settings.max_results,
            mode: self.settings.mode,
            include_raw_content: self.settings.include_raw_content,
        };
        let fut = self.search.search(&request);
        match self.settings.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| SearchError::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Search a fixed query list and format the results.
    pub async fn research_with_queries(
        &self,
        queries: Vec<String>,
        tokens_per_source: usize,
    ) -> ResearchOutcome {
        let (batches, failed_searches) = self.search_all(&queries).await;
        let context = deduplicate_and_format_sources(
            &batches,
            tokens_per_source,
            self.settings.include_raw_content,
        );
        ResearchOutcome {
            queries,
            context,
            failed_searches,
        }
    }

    /// Full research run: plan queries, search, format.
    pub async fn research(&self, request: &ResearchRequest) -> Result<ResearchOutcome> {
        tracing::info!("Researching {:?} topic: {}", request.purpose, request.topic);
        let queries = self.plan_queries(request).await?;
        let outcome = self
            .research_with_queries(queries, request.tokens_per_source)
            .await;
        if outcome.failed_searches > 0 {
            tracing::warn!(
                "{} of {} searches failed for topic: {}",
                outcome.failed_searches,
                outcome.queries.len(),
                request.topic
            );
        }
        Ok(outcome)
    }
}
