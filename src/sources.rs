//! Formatting of search results and completed sections into prompt context.
//!
//! Both functions are pure: the same input always yields byte-identical output.

use std::collections::HashSet;

use crate::report::Section;
use crate::search::{SearchResponse, SourceRecord};

/// Rough chars-per-token ratio used to turn a token budget into a char limit.
pub const CHARS_PER_TOKEN: usize = 4;

/// Appended to raw content that was cut at the budget.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Deduplicate search results by URL and format them as a context blob.
///
/// The first record seen for a URL wins; output follows first-seen order.
/// Raw page content is cut to `max_tokens_per_source * 4` characters.
pub fn deduplicate_and_format_sources(
    batches: &[SearchResponse],
    max_tokens_per_source: usize,
    include_raw_content: bool,
) -> String {
    let unique = unique_sources(batches);
    let char_limit = max_tokens_per_source.saturating_mul(CHARS_PER_TOKEN);

    let mut out = String::from("Sources:\n\n");
    for source in unique {
        let title = if source.title.is_empty() {
            "Unknown Title"
        } else {
            source.title.as_str()
        };
        out.push_str(&format!("Source {}:\n===\n", title));
        out.push_str(&format!("URL: {}\n===\n", source.url));
        out.push_str(&format!(
            "Most relevant content from source: {}\n===\n",
            source.snippet
        ));

        if include_raw_content {
            let raw = match source.raw_content.as_deref() {
                Some(raw) => raw,
                None => {
                    tracing::warn!("No raw_content found for source {}", source.url);
                    ""
                }
            };
            out.push_str(&format!(
                "Full source content limited to {} tokens: {}\n\n",
                max_tokens_per_source,
                truncate_chars(raw, char_limit)
            ));
        }
    }

    out.trim().to_string()
}

/// Flatten batches and keep the first record per URL.
fn unique_sources(batches: &[SearchResponse]) -> Vec<&SourceRecord> {
    let mut seen = HashSet::new();
    batches
        .iter()
        .flat_map(|batch| batch.results.iter())
        .filter(|source| seen.insert(source.url.as_str()))
        .collect()
}

/// Cut `s` to `limit` characters, appending [`TRUNCATION_MARKER`] when cut.
fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}{}", &s[..byte_idx], TRUNCATION_MARKER),
        None => s.to_string(),
    }
}

/// Render sections (typically the completed research sections) as context for
/// writing the synthesis sections.
pub fn format_sections(sections: &[Section]) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    for (idx, section) in sections.iter().enumerate() {
        let content = if section.content.is_empty() {
            "[Not yet written]"
        } else {
            section.content.as_str()
        };
        out.push_str(&format!(
            "\n{rule}\nSection {}: {}\n{rule}\nDescription:\n{}\nRequires Research:\n{}\n\nContent:\n{}\n\n",
            idx + 1,
            section.name,
            section.description,
            section.requires_research,
            content,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(records: Vec<SourceRecord>) -> SearchResponse {
        SearchResponse {
            query: None,
            results: records,
        }
    }

    #[test]
    fn test_deduplicates_by_url_first_seen_wins() {
        let batches = vec![
            batch(vec![
                SourceRecord::new("https://b.example", "B first", "b1"),
                SourceRecord::new("https://a.example", "A", "a"),
            ]),
            batch(vec![
                SourceRecord::new("https://b.example", "B second", "b2"),
                SourceRecord::new("https://c.example", "C", "c"),
            ]),
        ];

        let out = deduplicate_and_format_sources(&batches, 10, false);

        assert_eq!(out.matches("URL: ").count(), 3);
        assert!(out.contains("Source B first:"));
        assert!(!out.contains("B second"));

        let b = out.find("https://b.example").unwrap();
        let a = out.find("https://a.example").unwrap();
        let c = out.find("https://c.example").unwrap();
        assert!(b < a && a < c);
    }

    #[test]
    fn test_truncates_raw_content_to_budget() {
        let budget = 5;
        let raw = "x".repeat(budget * CHARS_PER_TOKEN + 7);
        let batches = vec![batch(vec![
            SourceRecord::new("https://a.example", "A", "a").with_raw_content(raw),
        ])];

        let out = deduplicate_and_format_sources(&batches, budget, true);

        let expected = format!(
            "Full source content limited to 5 tokens: {}{}",
            "x".repeat(budget * CHARS_PER_TOKEN),
            TRUNCATION_MARKER
        );
        assert!(out.ends_with(&expected));
    }

    #[test]
    fn test_short_raw_content_untouched_and_missing_is_empty() {
        let batches = vec![batch(vec![
            SourceRecord::new("https://a.example", "A", "a").with_raw_content("short body"),
            SourceRecord::new("https://b.example", "", "b"),
        ])];

        let out = deduplicate_and_format_sources(&batches, 100, true);

        assert!(out.contains("limited to 100 tokens: short body\n"));
        assert!(!out.contains(TRUNCATION_MARKER));
        assert!(out.contains("Source Unknown Title:"));
        assert!(out.ends_with("limited to 100 tokens:"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééééé", 3), format!("ééé{}", TRUNCATION_MARKER));
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn test_formatting_is_pure() {
        let batches = vec![batch(vec![
            SourceRecord::new("https://a.example", "A", "a").with_raw_content("y".repeat(50)),
            SourceRecord::new("https://b.example", "B", "b"),
        ])];
        let first = deduplicate_and_format_sources(&batches, 3, true);
        let second = deduplicate_and_format_sources(&batches, 3, true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_format_sections() {
        let mut done = Section::new("CPU", "Central processing units", true);
        done.content = "CPUs are general purpose.".to_string();
        let pending = Section::new("GPU", "Graphics processing units", true);

        let out = format_sections(&[done, pending]);

        assert!(out.contains("Section 1: CPU"));
        assert!(out.contains("Content:\nCPUs are general purpose."));
        assert!(out.contains("Section 2: GPU"));
        assert!(out.contains("[Not yet written]"));
    }
}
