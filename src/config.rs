//! Runtime configuration.
//!
//! Values come from an optional JSON file, then environment variables override
//! them. API keys are only ever read from the environment and never written out.
//!
//! Environment variables:
//! - `OPENROUTER_API_KEY`, `TAVILY_API_KEY` - provider credentials (required)
//! - `REPORT_MODEL` - model id
//! - `REPORT_QUERIES_PER_SECTION` - search queries generated per research step
//! - `REPORT_SEARCH_TOPIC` (`general`|`news`), `REPORT_SEARCH_DAYS`
//! - `REPORT_MAX_RESULTS` - results requested per query
//! - `REPORT_DISCOVERY_TOKENS_PER_SOURCE`, `REPORT_SECTION_TOKENS_PER_SOURCE`
//! - `REPORT_INCLUDE_RAW_CONTENT`
//! - `REPORT_SEQUENTIAL`, `REPORT_SECTION_DELAY_SECS` - throttled section processing
//! - `REPORT_CALL_TIMEOUT_SECS` - deadline for each model and search call
//! - `REPORT_INCLUDE_TITLE`

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ReportError, Result};
use crate::report::{ExecutionPolicy, ReportOptions};
use crate::research::ResearchSettings;
use crate::search::{SearchMode, SearchTopic};

pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub openrouter_api_key: String,
    #[serde(skip)]
    pub tavily_api_key: String,
    pub model: String,
    pub number_of_queries: usize,
    pub search_topic: SearchTopic,
    /// Recency window for news searches.
    pub search_days: Option<u32>,
    pub max_results: u32,
    pub discovery_tokens_per_source: usize,
    pub section_tokens_per_source: usize,
    pub include_raw_content: bool,
    pub sequential: bool,
    pub section_delay_secs: u64,
    pub call_timeout_secs: Option<u64>,
    pub include_title: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openrouter_api_key: String::new(),
            tavily_api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            number_of_queries: 5,
            search_topic: SearchTopic::General,
            search_days: Some(30),
            max_results: 5,
            discovery_tokens_per_source: 1000,
            section_tokens_per_source: 2000,
            include_raw_content: true,
            sequential: false,
            section_delay_secs: 0,
            call_timeout_secs: None,
            include_title: true,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load configuration from an optional JSON file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        let config = base.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a JSON file. Missing fields keep their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ReportError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            ReportError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Override fields with values found through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENROUTER_API_KEY") {
            self.openrouter_api_key = v;
        }
        if let Some(v) = get("TAVILY_API_KEY") {
            self.tavily_api_key = v;
        }
        if let Some(v) = get("REPORT_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("REPORT_QUERIES_PER_SECTION") {
            self.number_of_queries = parse("REPORT_QUERIES_PER_SECTION", &v)?;
        }
        if let Some(v) = get("REPORT_SEARCH_TOPIC") {
            self.search_topic = v.parse().map_err(ReportError::Config)?;
        }
        if let Some(v) = get("REPORT_SEARCH_DAYS") {
            self.search_days = Some(parse("REPORT_SEARCH_DAYS", &v)?);
        }
        if let Some(v) = get("REPORT_MAX_RESULTS") {
            self.max_results = parse("REPORT_MAX_RESULTS", &v)?;
        }
        if let Some(v) = get("REPORT_DISCOVERY_TOKENS_PER_SOURCE") {
            self.discovery_tokens_per_source = parse("REPORT_DISCOVERY_TOKENS_PER_SOURCE", &v)?;
        }
        if let Some(v) = get("REPORT_SECTION_TOKENS_PER_SOURCE") {
            self.section_tokens_per_source = parse("REPORT_SECTION_TOKENS_PER_SOURCE", &v)?;
        }
        if let Some(v) = get("REPORT_INCLUDE_RAW_CONTENT") {
            self.include_raw_content = parse_bool("REPORT_INCLUDE_RAW_CONTENT", &v)?;
        }
        if let Some(v) = get("REPORT_SEQUENTIAL") {
            self.sequential = parse_bool("REPORT_SEQUENTIAL", &v)?;
        }
        if let Some(v) = get("REPORT_SECTION_DELAY_SECS") {
            self.section_delay_secs = parse("REPORT_SECTION_DELAY_SECS", &v)?;
        }
        if let Some(v) = get("REPORT_CALL_TIMEOUT_SECS") {
            self.call_timeout_secs = Some(parse("REPORT_CALL_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("REPORT_INCLUDE_TITLE") {
            self.include_title = parse_bool("REPORT_INCLUDE_TITLE", &v)?;
        }
        Ok(self)
    }

    /// Check that the configuration can drive a report.
    pub fn validate(&self) -> Result<()> {
        if self.openrouter_api_key.is_empty() {
            return Err(ReportError::Config("OPENROUTER_API_KEY is not set".to_string()));
        }
        if self.tavily_api_key.is_empty() {
            return Err(ReportError::Config("TAVILY_API_KEY is not set".to_string()));
        }
        if self.number_of_queries == 0 {
            return Err(ReportError::Config(
                "number_of_queries must be at least 1".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(ReportError::Config("max_results must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn search_mode(&self) -> SearchMode {
        match self.search_topic {
            SearchTopic::News => SearchMode::news(self.search_days),
            SearchTopic::General => SearchMode::general(),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn execution_policy(&self) -> ExecutionPolicy {
        if self.sequential {
            ExecutionPolicy::Sequential {
                delay: Duration::from_secs(self.section_delay_secs),
            }
        } else {
            ExecutionPolicy::Concurrent
        }
    }

    pub fn research_settings(&self) -> ResearchSettings {
        ResearchSettings {
            mode: self.search_mode(),
            max_results: self.max_results,
            include_raw_content: self.include_raw_content,
            call_timeout: self.call_timeout(),
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            number_of_queries: self.number_of_queries,
            discovery_tokens_per_source: self.discovery_tokens_per_source,
            section_tokens_per_source: self.section_tokens_per_source,
            execution: self.execution_policy(),
            include_title: self.include_title,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ReportError::Config(format!("invalid {}={:?}: {}", key, value, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReportError::Config(format!(
            "invalid {}={:?}: expected a boolean",
            key, value
        ))),
    }
}
