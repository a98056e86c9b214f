//! Report module - plan, research, write and assemble a multi-section report.
//!
//! # Key Concepts
//! - Section: one titled unit of the report, written exactly once
//! - Planner: turns a topic and a structure template into an ordered outline
//! - Writer: writes a section from research sources or from completed sections
//! - Orchestrator: linear state machine driving the whole pipeline

mod orchestrator;
mod planner;
mod writer;

pub use orchestrator::{ExecutionPolicy, ReportOptions, ReportOrchestrator};
pub use planner::{PlanOutcome, PlannerOptions, ReportPlanner};
pub use writer::{placeholder_content, SectionWriter, WriteMode};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::StructuredOutput;

/// A section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Short title, unique within a report.
    pub name: String,
    /// Scope guidance for research and writing.
    pub description: String,
    /// Whether the section is grounded in fresh web research. Fixed at planning time.
    #[serde(rename = "research")]
    pub requires_research: bool,
    /// Written content; empty until the section is written.
    #[serde(default)]
    pub content: String,
}

impl Section {
    pub fn new(name: impl Into<String>, description: impl Into<String>, requires_research: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            requires_research,
            content: String::new(),
        }
    }

    pub fn is_written(&self) -> bool {
        !self.content.is_empty()
    }

    /// Copy of this section carrying `content`.
    pub fn written(&self, content: String) -> Self {
        Self {
            content,
            ..self.clone()
        }
    }
}

/// A section as proposed by the model during planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedSection {
    /// Name for this section of the report.
    pub name: String,
    /// Brief overview of the main topics and concepts to be covered in this section.
    pub description: String,
    /// Whether to perform web research for this section of the report.
    pub research: bool,
}

/// Collection of planned sections of the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sections {
    /// Optional report title.
    #[serde(default)]
    pub title: Option<String>,
    /// Sections of the report, in presentation order.
    pub sections: Vec<PlannedSection>,
}

impl StructuredOutput for Sections {
    fn is_usable(&self) -> bool {
        !self.sections.is_empty()
    }
}

/// Title plus ordered sections. Section order is the presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPlan {
    pub title: String,
    pub sections: Vec<Section>,
}

impl ReportPlan {
    pub fn research_sections(&self) -> impl Iterator<Item = (usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.requires_research)
    }

    pub fn synthesis_sections(&self) -> impl Iterator<Item = (usize, &Section)> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.requires_research)
    }
}

/// Report-structure template supplied by the caller.
///
/// Structured values are accepted and rendered to text before prompting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportStructure {
    Text(String),
    Structured(serde_json::Value),
}

impl ReportStructure {
    /// Text form used in prompts.
    pub fn to_prompt_text(&self) -> String {
        match self {
            ReportStructure::Text(s) => s.clone(),
            ReportStructure::Structured(serde_json::Value::String(s)) => s.clone(),
            ReportStructure::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

impl From<&str> for ReportStructure {
    fn from(s: &str) -> Self {
        ReportStructure::Text(s.to_string())
    }
}

impl From<String> for ReportStructure {
    fn from(s: String) -> Self {
        ReportStructure::Text(s)
    }
}

impl From<serde_json::Value> for ReportStructure {
    fn from(value: serde_json::Value) -> Self {
        ReportStructure::Structured(value)
    }
}

/// Phase of the report state machine. Transitions are strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPhase {
    Planning,
    ResearchingAndWriting,
    Synthesizing,
    Assembled,
}

impl std::fmt::Display for ReportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Planning => "planning",
            Self::ResearchingAndWriting => "researching_and_writing",
            Self::Synthesizing => "synthesizing",
            Self::Assembled => "assembled",
        };
        write!(f, "{}", s)
    }
}

/// What was searched for a single research section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResearch {
    pub section: String,
    pub queries: Vec<String>,
    pub failed_searches: usize,
    /// True when query generation failed and the section description was searched instead.
    pub used_fallback_query: bool,
}

/// State threaded through the orchestrator's phases.
#[derive(Debug, Clone)]
pub struct ReportState {
    pub id: Uuid,
    pub topic: String,
    pub report_structure: String,
    pub phase: ReportPhase,
    pub plan: Option<ReportPlan>,
    /// Topic-wide queries run while planning.
    pub discovery_queries: Vec<String>,
    /// One slot per planned section, filled as sections are written.
    pub completed: Vec<Option<Section>>,
    pub research_log: Vec<SectionResearch>,
}

impl ReportState {
    pub fn new(topic: impl Into<String>, structure: &ReportStructure) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            report_structure: structure.to_prompt_text(),
            phase: ReportPhase::Planning,
            plan: None,
            discovery_queries: Vec::new(),
            completed: Vec::new(),
            research_log: Vec::new(),
        }
    }
}

/// The finished report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub topic: String,
    /// Written sections in plan order.
    pub sections: Vec<Section>,
    /// Assembled report text.
    pub text: String,
    pub discovery_queries: Vec<String>,
    pub research: Vec<SectionResearch>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }
}
