//! End-to-end report generation against scripted model and search providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use report_agent::llm::{ChatMessage, ChatResponse, LlmClient, StructuredInvoker};
use report_agent::report::{ExecutionPolicy, ReportOptions};
use report_agent::research::ResearchSettings;
use report_agent::search::{SearchClient, SearchError, SearchRequest, SearchResponse, SourceRecord};
use report_agent::{ReportError, ReportOrchestrator};

const COMPARISON_STRUCTURE: &str = "The report structure should include:
1. Introduction (no research needed)
2. One dedicated section for EACH item in the user-provided list
3. Conclusion with comparison table (no research needed)";

const CPU_GPU_OUTLINE: &str = r#"{"sections": [
    {"name": "Introduction", "description": "Why compare processors", "research": false},
    {"name": "CPU", "description": "Central processing units: features and use cases", "research": true},
    {"name": "GPU", "description": "Graphics processing units: features and use cases", "research": true},
    {"name": "Conclusion", "description": "Comparison table and recommendations", "research": false}
]}"#;

fn field<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    text[start..].lines().next().map(str::trim)
}

/// Scripted model: recognises each prompt by its template.
struct HardwareModel {
    outline: Option<&'static str>,
}

#[async_trait]
impl LlmClient for HardwareModel {
    async fn chat_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
    ) -> anyhow::Result<ChatResponse> {
        let system = messages[0].text_content().unwrap_or_default();

        if system.contains("generate the outline") {
            return match self.outline {
                Some(outline) => Ok(ChatResponse::from_text(outline)),
                None => Ok(ChatResponse::default()),
            };
        }
        if system.contains("search queries") {
            let topic = field(system, "Topic for this section:\n").unwrap_or("processors");
            return Ok(ChatResponse::from_text(format!(
                r#"{{"queries": ["{} architecture", "{} benchmarks"]}}"#,
                topic, topic
            )));
        }
        if let Some(name) = field(system, "Title for the section:\n") {
            return Ok(ChatResponse::from_text(format!(
                "## {}\nDetails about {} drawn from sources.",
                name, name
            )));
        }
        if let Some(name) = field(system, "Section to write:\n") {
            return Ok(ChatResponse::from_text(format!(
                "## {}\nSummary built from the researched sections.",
                name
            )));
        }
        anyhow::bail!("unrecognised prompt")
    }
}

/// Returns the same popular page for every query plus one page per query.
#[derive(Default)]
struct HardwareSearch {
    calls: AtomicUsize,
}

#[async_trait]
impl SearchClient for HardwareSearch {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchResponse {
            query: Some(request.query.clone()),
            results: vec![
                SourceRecord::new("https://wiki.example/processors", "Processors", "overview")
                    .with_raw_content("p".repeat(20_000)),
                SourceRecord::new(
                    format!("https://docs.example/{}", request.query.len()),
                    request.query.clone(),
                    "details",
                ),
            ],
        })
    }
}

fn orchestrator(model: HardwareModel, search: Arc<HardwareSearch>, options: ReportOptions) -> ReportOrchestrator {
    let invoker = StructuredInvoker::new(Arc::new(model), "scripted");
    ReportOrchestrator::new(invoker, search, ResearchSettings::default(), options)
}

#[tokio::test]
async fn test_compare_cpu_and_gpu() {
    let search = Arc::new(HardwareSearch::default());
    let o = orchestrator(
        HardwareModel {
            outline: Some(CPU_GPU_OUTLINE),
        },
        search.clone(),
        ReportOptions {
            number_of_queries: 2,
            ..Default::default()
        },
    );

    let report = o
        .run("Compare CPU and GPU", COMPARISON_STRUCTURE)
        .await
        .unwrap();

    let plan: Vec<(&str, bool)> = report
        .sections
        .iter()
        .map(|s| (s.name.as_str(), s.requires_research))
        .collect();
    assert_eq!(
        plan,
        vec![
            ("Introduction", false),
            ("CPU", true),
            ("GPU", true),
            ("Conclusion", false)
        ]
    );
    assert!(report.sections.iter().all(|s| s.is_written()));

    let positions: Vec<usize> = ["## Introduction", "## CPU", "## GPU", "## Conclusion"]
        .iter()
        .map(|heading| report.text.find(heading).expect(heading))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(report.text.starts_with("# Compare CPU and GPU"));

    // two discovery queries plus two per research section
    assert_eq!(report.discovery_queries.len(), 2);
    assert_eq!(report.research.len(), 2);
    assert_eq!(search.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_structured_template_and_sequential_mode() {
    let o = orchestrator(
        HardwareModel {
            outline: Some(CPU_GPU_OUTLINE),
        },
        Arc::new(HardwareSearch::default()),
        ReportOptions {
            number_of_queries: 1,
            execution: ExecutionPolicy::Sequential {
                delay: std::time::Duration::from_millis(1),
            },
            include_title: false,
            ..Default::default()
        },
    );

    let structure = serde_json::json!({
        "introduction": "no research",
        "body": "one section per item",
        "conclusion": "comparison table"
    });
    let report = o.run("Compare CPU and GPU", structure).await.unwrap();

    assert_eq!(report.sections.len(), 4);
    assert!(report.text.starts_with("## Introduction"));
}

#[tokio::test]
async fn test_unusable_outline_fails_the_report() {
    let search = Arc::new(HardwareSearch::default());
    let o = orchestrator(
        HardwareModel { outline: None },
        search.clone(),
        ReportOptions::default(),
    );

    let err = o
        .run("Compare CPU and GPU", COMPARISON_STRUCTURE)
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::PlanningFailure { .. }));
    assert!(err.to_string().contains("3 attempts"));
}
