//! Instruction templates for each model call in the pipeline.

/// Discovery queries: topic-wide, used once while planning the outline.
pub fn discovery_query_instructions(
    topic: &str,
    report_organization: &str,
    number_of_queries: usize,
) -> String {
    format!(
        r#"You are an expert technical writer, helping to plan a report.

The report will be focused on the following topic:
{topic}

The report will follow this organization:
{report_organization}

Your goal is to generate {number_of_queries} search queries that will help gather comprehensive
information for planning the report sections.

The queries should:
1. Be related to the topic
2. Help satisfy the requirements specified in the report organization

Make the queries specific enough to find high-quality, relevant sources while covering the breadth
needed for the report structure.

Respond with a JSON object of the form {{"queries": ["...", "..."]}}."#
    )
}

/// Detail queries: scoped to a single section.
pub fn detail_query_instructions(section_topic: &str, number_of_queries: usize) -> String {
    format!(
        r#"Your goal is to generate targeted web search queries that will gather comprehensive
information for writing a technical report section.

Topic for this section:
{section_topic}

When generating {number_of_queries} search queries, ensure they:
1. Cover different aspects of the topic (core features, real-world applications, technical architecture)
2. Include specific technical terms related to the topic
3. Look for comparisons or differentiators from similar technologies
4. Search for both official documentation and practical implementation examples

Respond with a JSON object of the form {{"queries": ["...", "..."]}}."#
    )
}

pub const QUERY_REQUEST: &str =
    "Generate search queries that will help with planning the sections of the report.";

pub const SECTION_QUERY_REQUEST: &str = "Generate search queries on the provided topic.";

/// Outline generation from the discovery context.
pub fn planner_instructions(topic: &str, report_organization: &str, context: &str) -> String {
    format!(
        r#"You are an expert technical writer, helping to plan a report.

Your goal is to generate the outline of the sections of the report.

The overall topic of the report is:
{topic}

The report should follow this organization:
{report_organization}

You should reflect on this information to plan the sections of the report:
{context}

Each section must have a short unique name, a description of what it covers,
and a research flag that is true only when the section needs fresh web research.
Introductions and conclusions that summarize other sections do not need research.

Respond with a JSON object of the form
{{"sections": [{{"name": "...", "description": "...", "research": true}}]}}."#
    )
}

pub const PLANNER_REQUEST: &str = "Generate the sections of the report. Your response must include a 'sections' field containing a list of sections. Each section must have: name, description and research fields.";

/// Writing a research-backed section from its sources.
pub fn section_writer_instructions(section_title: &str, section_topic: &str, context: &str) -> String {
    format!(
        r#"You are an expert technical writer crafting one section of a technical report.

Title for the section:
{section_title}

Topic for this section:
{section_topic}

Guidelines for writing:
- Use technical terms precisely and be concrete
- Start with the markdown heading: ## {section_title}
- Ground every claim in the provided sources
- End with a short list of the source URLs you used

Use these sources to write the section:
{context}"#
    )
}

/// Writing an introduction or conclusion from the completed sections.
pub fn final_section_writer_instructions(
    section_title: &str,
    section_topic: &str,
    context: &str,
) -> String {
    format!(
        r#"You are an expert technical writer crafting a section that synthesizes information
from the rest of the report.

Section to write:
{section_title}

Topic for this section:
{section_topic}

Available report content:
{context}

Guidelines for writing:
- Start with the markdown heading: ## {section_title}
- For an introduction, give a brief overview and motivate the report; no sources section
- For a conclusion, summarize the key findings and include a comparison table where items are compared
- Do not introduce facts that are not present in the report content"#
    )
}

pub const SECTION_REQUEST: &str = "Generate a report section based on the provided sources.";
