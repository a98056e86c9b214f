//! Report orchestrator - the top-level state machine.
//!
//! ```text
//!   Planning ──▶ ResearchingAndWriting ──▶ Synthesizing ──▶ Assembled
//!      │                 │                      │
//!   planner        fan-out per research    fan-out per synthesis
//!                  section (or throttled)  section, after barrier
//! ```
//!
//! Each fan-out task owns a copy of its section and returns it together with the
//! index captured at fan-out time, so write-back lands in a fixed slot no matter
//! which task finishes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;

use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::llm::{LlmClient, StructuredInvoker};
use crate::research::{QueryPurpose, ResearchRequest, ResearchSettings, Researcher};
use crate::search::SearchClient;
use crate::sources::format_sections;

use super::planner::{PlannerOptions, ReportPlanner};
use super::writer::{placeholder_content, SectionWriter, WriteMode};
use super::{Report, ReportPhase, ReportState, ReportStructure, Section, SectionResearch};

/// How research sections are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// All research sections at once.
    Concurrent,
    /// One at a time with a fixed pause between sections, for rate-limited providers.
    Sequential { delay: Duration },
}

/// Orchestrator knobs.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Queries generated per research step.
    pub number_of_queries: usize,
    pub discovery_tokens_per_source: usize,
    pub section_tokens_per_source: usize,
    pub execution: ExecutionPolicy,
    /// Prefix the report text with `# <title>`.
    pub include_title: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            number_of_queries: 5,
            discovery_tokens_per_source: 1000,
            section_tokens_per_source: 2000,
            execution: ExecutionPolicy::Concurrent,
            include_title: true,
        }
    }
}

/// Drives a report from topic to assembled text.
pub struct ReportOrchestrator {
    planner: ReportPlanner,
    researcher: Researcher,
    writer: SectionWriter,
    options: ReportOptions,
}

impl ReportOrchestrator {
    /// Build an orchestrator from injected clients.
    pub fn new(
        invoker: StructuredInvoker,
        search: Arc<dyn SearchClient>,
        settings: ResearchSettings,
        options: ReportOptions,
    ) -> Self {
        let researcher = Researcher::new(invoker.clone(), search, settings);
        let planner = ReportPlanner::new(
            invoker.clone(),
            researcher.clone(),
            PlannerOptions {
                number_of_queries: options.number_of_queries,
                tokens_per_source: options.discovery_tokens_per_source,
            },
        );
        Self {
            planner,
            researcher,
            writer: SectionWriter::new(invoker),
            options,
        }
    }

    /// Build an orchestrator with every knob taken from `config`.
    pub fn from_config(
        config: &Config,
        llm: Arc<dyn LlmClient>,
        search: Arc<dyn SearchClient>,
    ) -> Self {
        let invoker = StructuredInvoker::new(llm, config.model.clone())
            .with_call_timeout(config.call_timeout());
        Self::new(
            invoker,
            search,
            config.research_settings(),
            config.report_options(),
        )
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Generate a full report.
    ///
    /// Returns either a report containing every planned section (some possibly
    /// holding placeholder content) or a fatal error.
    pub async fn run(
        &self,
        topic: &str,
        report_structure: impl Into<ReportStructure>,
    ) -> Result<Report> {
        let structure = report_structure.into();
        let mut state = ReportState::new(topic, &structure);
        tracing::info!("Starting report {} for topic: {}", state.id, topic);

        while state.phase != ReportPhase::Assembled {
            let from = state.phase;
            state = self.step(state).await?;
            tracing::info!("Report {}: {} -> {}", state.id, from, state.phase);
        }

        finish(state, self.options.include_title)
    }

    /// Advance the state machine by one phase.
    pub async fn step(&self, state: ReportState) -> Result<ReportState> {
        match state.phase {
            ReportPhase::Planning => self.plan(state).await,
            ReportPhase::ResearchingAndWriting => Ok(self.research_and_write(state).await),
            ReportPhase::Synthesizing => Ok(self.synthesize(state).await),
            ReportPhase::Assembled => Ok(state),
        }
    }

    async fn plan(&self, mut state: ReportState) -> Result<ReportState> {
        let outcome = self
            .planner
            .plan(&state.topic, &state.report_structure)
            .await?;
        state.completed = vec![None; outcome.plan.sections.len()];
        state.discovery_queries = outcome.discovery.queries;
        state.plan = Some(outcome.plan);
        state.phase = ReportPhase::ResearchingAndWriting;
        Ok(state)
    }

    async fn research_and_write(&self, mut state: ReportState) -> ReportState {
        let jobs: Vec<(usize, Section)> = state
            .plan
            .as_ref()
            .map(|plan| {
                plan.research_sections()
                    .map(|(idx, section)| (idx, section.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let results = match self.options.execution {
            ExecutionPolicy::Concurrent => {
                join_all(
                    jobs.into_iter()
                        .map(|(idx, section)| self.research_section(idx, section)),
                )
                .await
            }
            ExecutionPolicy::Sequential { delay } => {
                let mut results = Vec::with_capacity(jobs.len());
                let total = jobs.len();
                for (n, (idx, section)) in jobs.into_iter().enumerate() {
                    results.push(self.research_section(idx, section).await);
                    if n + 1 < total && !delay.is_zero() {
                        tracing::debug!("Pausing {:?} before next section", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
                results
            }
        };

        for (idx, section, research) in results {
            store(&mut state.completed, idx, section);
            state.research_log.push(research);
        }
        state.phase = ReportPhase::Synthesizing;
        state
    }

    /// Research and write one section. Never fails; failures degrade the content.
    async fn research_section(
        &self,
        idx: usize,
        section: Section,
    ) -> (usize, Section, SectionResearch) {
        let request = ResearchRequest {
            topic: section.description.clone(),
            report_organization: None,
            purpose: QueryPurpose::Detail,
            number_of_queries: self.options.number_of_queries,
            tokens_per_source: self.options.section_tokens_per_source,
        };

        let (queries, used_fallback_query) = match self.researcher.plan_queries(&request).await {
            Ok(queries) => (queries, false),
            Err(e) => {
                tracing::warn!(
                    "Query generation failed for section {:?}, searching its description instead: {}",
                    section.name,
                    e
                );
                (vec![section.description.clone()], true)
            }
        };

        let outcome = self
            .researcher
            .research_with_queries(queries, request.tokens_per_source)
            .await;
        let written = self
            .writer
            .write(&section, &outcome.context, WriteMode::Research)
            .await;

        let research = SectionResearch {
            section: section.name.clone(),
            queries: outcome.queries,
            failed_searches: outcome.failed_searches,
            used_fallback_query,
        };
        (idx, written, research)
    }

    async fn synthesize(&self, mut state: ReportState) -> ReportState {
        let researched: Vec<Section> = state.completed.iter().flatten().cloned().collect();
        let context = format_sections(&researched);

        let jobs: Vec<(usize, Section)> = state
            .plan
            .as_ref()
            .map(|plan| {
                plan.synthesis_sections()
                    .map(|(idx, section)| (idx, section.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let context = context.as_str();
        let results = join_all(jobs.into_iter().map(|(idx, section)| async move {
            let written = self.writer.write(&section, context, WriteMode::Synthesis).await;
            (idx, written)
        }))
        .await;

        for (idx, section) in results {
            store(&mut state.completed, idx, section);
        }
        state.phase = ReportPhase::Assembled;
        state
    }
}

/// Put a written section in its slot. Each slot is written once.
fn store(slots: &mut [Option<Section>], idx: usize, section: Section) {
    match slots.get_mut(idx) {
        Some(slot) if slot.is_none() => *slot = Some(section),
        Some(_) => tracing::error!(
            "Section slot {} already written; ignoring second write of {:?}",
            idx,
            section.name
        ),
        None => tracing::error!("Section slot {} out of range", idx),
    }
}

/// Reassemble the completed sections in plan order and render the report.
fn finish(state: ReportState, include_title: bool) -> Result<Report> {
    let plan = state
        .plan
        .ok_or_else(|| ReportError::planning("report reached assembly without a plan"))?;

    let mut by_name: HashMap<String, Section> = state
        .completed
        .into_iter()
        .flatten()
        .map(|s| (s.name.clone(), s))
        .collect();

    let sections: Vec<Section> = plan
        .sections
        .iter()
        .map(|planned| {
            by_name.remove(&planned.name).unwrap_or_else(|| {
                tracing::error!("Section {:?} was never written", planned.name);
                planned.written(placeholder_content(&planned.name))
            })
        })
        .collect();

    let mut text = String::new();
    if include_title && !plan.title.is_empty() {
        text.push_str(&format!("# {}\n\n", plan.title));
    }
    text.push_str(
        &sections
            .iter()
            .map(|s| s.content.trim())
            .collect::<Vec<_>>()
            .join("\n\n"),
    );

    Ok(Report {
        id: state.id,
        title: plan.title,
        topic: state.topic,
        sections,
        text,
        discovery_queries: state.discovery_queries,
        research: state.research_log,
        generated_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatResponse};
    use crate::search::{SearchError, SearchRequest, SearchResponse, SourceRecord};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Text on the line following `marker`, if present.
    fn line_after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
        let start = text.find(marker)? + marker.len();
        text[start..].lines().next().map(str::trim)
    }

    /// Routes each prompt by its template and records write completion order.
    #[derive(Default)]
    struct FakeModel {
        outline: &'static str,
        delays: HashMap<&'static str, u64>,
        failing_writes: HashSet<&'static str>,
        failing_queries: HashSet<&'static str>,
        completed: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn completed(&self) -> Vec<String> {
            self.completed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for FakeModel {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
        ) -> anyhow::Result<ChatResponse> {
            let system = messages[0].text_content().unwrap_or_default();

            if system.contains("generate the outline") {
                return Ok(ChatResponse::from_text(self.outline));
            }
            if let Some(topic) = line_after(system, "Topic for this section:\n") {
                if system.contains("search queries") {
                    if self.failing_queries.contains(topic) {
                        return Err(anyhow::anyhow!("query model down"));
                    }
                    return Ok(ChatResponse::from_text(format!(
                        r#"{{"queries": ["{} overview"]}}"#,
                        topic
                    )));
                }
            }
            if system.contains("search queries") {
                return Ok(ChatResponse::from_text(r#"{"queries": ["discovery"]}"#));
            }
            if let Some(name) = line_after(system, "Title for the section:\n") {
                let name = name.to_string();
                if let Some(ms) = self.delays.get(name.as_str()) {
                    tokio::time::sleep(Duration::from_millis(*ms)).await;
                }
                if self.failing_writes.contains(name.as_str()) {
                    return Err(anyhow::anyhow!("writer model down"));
                }
                self.completed.lock().unwrap().push(name.clone());
                return Ok(ChatResponse::from_text(format!("## {}\nresearched body of {}", name, name)));
            }
            if let Some(name) = line_after(system, "Section to write:\n") {
                let saw: Vec<&str> = ["B", "C"]
                    .into_iter()
                    .filter(|n| system.contains(&format!("researched body of {}", n)))
                    .collect();
                self.completed.lock().unwrap().push(name.to_string());
                return Ok(ChatResponse::from_text(format!(
                    "## {}\nsynthesized from [{}]",
                    name,
                    saw.join(",")
                )));
            }
            Err(anyhow::anyhow!("unexpected prompt"))
        }
    }

    #[derive(Default)]
    struct EchoSearch {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchClient for EchoSearch {
        async fn search(
            &self,
            request: &SearchRequest,
        ) -> std::result::Result<SearchResponse, SearchError> {
            self.queries.lock().unwrap().push(request.query.clone());
            Ok(SearchResponse {
                query: Some(request.query.clone()),
                results: vec![SourceRecord::new(
                    format!("https://search.example/{}", request.query.len()),
                    request.query.clone(),
                    "snippet",
                )],
            })
        }
    }

    const ABCD: &str = r#"{"title": "Letters", "sections": [
        {"name": "A", "description": "intro a", "research": false},
        {"name": "B", "description": "topic b", "research": true},
        {"name": "C", "description": "topic c", "research": true},
        {"name": "D", "description": "wrap-up d", "research": false}
    ]}"#;

    fn orchestrator(model: Arc<FakeModel>, search: Arc<EchoSearch>, options: ReportOptions) -> ReportOrchestrator {
        let invoker = StructuredInvoker::new(model, "fake");
        ReportOrchestrator::new(invoker, search, ResearchSettings::default(), options)
    }

    fn names(report: &Report) -> Vec<&str> {
        report.sections.iter().map(|s| s.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_plan_order_survives_out_of_order_completion() {
        let model = Arc::new(FakeModel {
            outline: ABCD,
            delays: HashMap::from([("B", 80)]),
            ..Default::default()
        });
        let o = orchestrator(model.clone(), Arc::new(EchoSearch::default()), ReportOptions::default());

        let report = o.run("letters", "intro, body, outro").await.unwrap();

        let completed = model.completed();
        let b = completed.iter().position(|n| n == "B").unwrap();
        let c = completed.iter().position(|n| n == "C").unwrap();
        assert!(c < b, "C should finish before the delayed B: {:?}", completed);

        assert_eq!(names(&report), vec!["A", "B", "C", "D"]);
        let heading_positions: Vec<usize> = ["## A", "## B", "## C", "## D"]
            .iter()
            .map(|h| report.text.find(h).unwrap())
            .collect();
        assert!(heading_positions.windows(2).all(|w| w[0] < w[1]));
        assert!(report.text.starts_with("# Letters\n\n"));
    }

    #[tokio::test]
    async fn test_synthesis_waits_for_all_research_sections() {
        let model = Arc::new(FakeModel {
            outline: ABCD,
            delays: HashMap::from([("B", 40), ("C", 20)]),
            ..Default::default()
        });
        let o = orchestrator(model.clone(), Arc::new(EchoSearch::default()), ReportOptions::default());

        let report = o.run("letters", "structure").await.unwrap();

        assert_eq!(report.section("A").unwrap().content, "## A\nsynthesized from [B,C]");
        assert_eq!(report.section("D").unwrap().content, "## D\nsynthesized from [B,C]");
        let completed = model.completed();
        assert_eq!(completed[2..].iter().collect::<HashSet<_>>().len(), 2);
        assert!(completed[..2].iter().all(|n| n == "B" || n == "C"));
    }

    #[tokio::test]
    async fn test_failed_write_degrades_to_placeholder() {
        let model = Arc::new(FakeModel {
            outline: ABCD,
            failing_writes: HashSet::from(["C"]),
            ..Default::default()
        });
        let o = orchestrator(model, Arc::new(EchoSearch::default()), ReportOptions::default());

        let report = o.run("letters", "structure").await.unwrap();

        assert_eq!(report.sections.len(), 4);
        assert_eq!(report.section("C").unwrap().content, placeholder_content("C"));
        assert_eq!(report.section("B").unwrap().content, "## B\nresearched body of B");
        assert!(report.section("A").unwrap().content.starts_with("## A"));
        assert!(report.section("D").unwrap().content.starts_with("## D"));
        assert!(report.text.contains("[Error: failed to write section 'C']"));
    }

    #[tokio::test]
    async fn test_query_generation_failure_falls_back_to_description() {
        let model = Arc::new(FakeModel {
            outline: ABCD,
            failing_queries: HashSet::from(["topic c"]),
            ..Default::default()
        });
        let search = Arc::new(EchoSearch::default());
        let o = orchestrator(model, search.clone(), ReportOptions::default());

        let report = o.run("letters", "structure").await.unwrap();

        let c = report.research.iter().find(|r| r.section == "C").unwrap();
        assert!(c.used_fallback_query);
        assert_eq!(c.queries, vec!["topic c"]);
        let b = report.research.iter().find(|r| r.section == "B").unwrap();
        assert!(!b.used_fallback_query);
        assert_eq!(b.queries, vec!["topic b overview"]);
        assert!(search.queries.lock().unwrap().contains(&"topic c".to_string()));
        assert_eq!(report.section("C").unwrap().content, "## C\nresearched body of C");
    }

    #[tokio::test]
    async fn test_sequential_mode_pauses_between_sections() {
        let model = Arc::new(FakeModel {
            outline: ABCD,
            delays: HashMap::from([("B", 30)]),
            ..Default::default()
        });
        let options = ReportOptions {
            execution: ExecutionPolicy::Sequential {
                delay: Duration::from_millis(25),
            },
            include_title: false,
            ..Default::default()
        };
        let o = orchestrator(model.clone(), Arc::new(EchoSearch::default()), options);

        let started = Instant::now();
        let report = o.run("letters", "structure").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(55));
        assert_eq!(&model.completed()[..2], &["B".to_string(), "C".to_string()]);
        assert!(report.text.starts_with("## A"));
    }

    #[tokio::test]
    async fn test_planning_failure_is_fatal() {
        let model = Arc::new(FakeModel {
            outline: r#"{"sections": []}"#,
            ..Default::default()
        });
        let o = orchestrator(model.clone(), Arc::new(EchoSearch::default()), ReportOptions::default());

        let err = o.run("letters", "structure").await.unwrap_err();

        assert!(matches!(err, ReportError::PlanningFailure { .. }));
        assert!(model.completed().is_empty());
    }

    #[test]
    fn test_store_writes_each_slot_once() {
        let mut slots = vec![None, None];
        store(&mut slots, 1, Section::new("B", "b", true).written("first".to_string()));
        store(&mut slots, 1, Section::new("B", "b", true).written("second".to_string()));
        store(&mut slots, 5, Section::new("Z", "z", true));
        assert!(slots[0].is_none());
        assert_eq!(slots[1].as_ref().unwrap().content, "first");
    }
}
