//! Report planner: discovery research followed by outline generation.

use std::collections::HashSet;

use crate::error::{ReportError, Result};
use crate::llm::{ChatMessage, StructuredInvoker};
use crate::prompts;
use crate::research::{QueryPurpose, ResearchOutcome, ResearchRequest, Researcher};

use super::{ReportPlan, Section, Sections};

/// Knobs for the planning step.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub number_of_queries: usize,
    pub tokens_per_source: usize,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            number_of_queries: 5,
            tokens_per_source: 1000,
        }
    }
}

/// Result of planning: the outline plus the discovery research it was based on.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: ReportPlan,
    pub discovery: ResearchOutcome,
}

#[derive(Clone)]
pub struct ReportPlanner {
    invoker: StructuredInvoker,
    researcher: Researcher,
    options: PlannerOptions,
}

impl ReportPlanner {
    pub fn new(invoker: StructuredInvoker, researcher: Researcher, options: PlannerOptions) -> Self {
        Self {
            invoker,
            researcher,
            options,
        }
    }

    /// Produce the ordered outline for `topic`.
    ///
    /// Any model exhaustion here is fatal and reported as `PlanningFailure`.
    pub async fn plan(&self, topic: &str, report_structure: &str) -> Result<PlanOutcome> {
        tracing::info!("Planning report for topic: {}", topic);

        let request = ResearchRequest {
            topic: topic.to_string(),
            report_organization: Some(report_structure.to_string()),
            purpose: QueryPurpose::Discovery,
            number_of_queries: self.options.number_of_queries,
            tokens_per_source: self.options.tokens_per_source,
        };
        let discovery = self
            .researcher
            .research(&request)
            .await
            .map_err(|e| ReportError::planning(format!("discovery research failed: {}", e)))?;

        let messages = [
            ChatMessage::system(prompts::planner_instructions(
                topic,
                report_structure,
                &discovery.context,
            )),
            ChatMessage::user(prompts::PLANNER_REQUEST),
        ];
        let outline: Sections = self
            .invoker
            .invoke(&messages)
            .await
            .map_err(|e| ReportError::planning(format!("outline generation failed: {}", e)))?;

        let plan = build_plan(topic, outline)?;
        tracing::info!(
            "Planned {} sections ({} need research): {:?}",
            plan.sections.len(),
            plan.research_sections().count(),
            plan.sections.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        Ok(PlanOutcome { plan, discovery })
    }
}

/// Turn the model's outline into a plan, keeping model order.
///
/// Blank names get a positional name and repeated names get a numeric suffix,
/// so every section name in a plan is unique.
fn build_plan(topic: &str, outline: Sections) -> Result<ReportPlan> {
    if outline.sections.is_empty() {
        return Err(ReportError::planning("outline contained no sections"));
    }

    let mut seen = HashSet::new();
    let sections = outline
        .sections
        .into_iter()
        .enumerate()
        .map(|(idx, planned)| {
            let base = match planned.name.trim() {
                "" => format!("Section {}", idx + 1),
                name => name.to_string(),
            };
            let mut name = base.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{} ({})", base, n);
                n += 1;
            }
            if name != planned.name {
                tracing::warn!("Renamed planned section {:?} to {:?}", planned.name, name);
            }
            Section::new(name, planned.description, planned.research)
        })
        .collect();

    let title = outline
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| topic.trim().to_string());

    Ok(ReportPlan { title, sections })
}
