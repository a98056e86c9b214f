//! Section writer.
//!
//! Writing never fails the report: an unusable response becomes visible
//! placeholder content naming the section.

use crate::error::{ReportError, Result};
use crate::llm::{ChatMessage, StructuredInvoker};
use crate::prompts;

use super::Section;

/// Which template a section is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Grounded in the section's own research context.
    Research,
    /// Synthesized from the already-completed sections.
    Synthesis,
}

/// Content used when a section could not be written.
pub fn placeholder_content(section_name: &str) -> String {
    format!("[Error: failed to write section '{}']", section_name)
}

#[derive(Clone)]
pub struct SectionWriter {
    invoker: StructuredInvoker,
}

impl SectionWriter {
    pub fn new(invoker: StructuredInvoker) -> Self {
        Self { invoker }
    }

    /// Write `section` and return the written copy. Failures degrade to a placeholder.
    pub async fn write(&self, section: &Section, context: &str, mode: WriteMode) -> Section {
        let content = match self.try_write(section, context, mode).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("{}; using placeholder content", e);
                placeholder_content(&section.name)
            }
        };
        section.written(content)
    }

    /// Write `section`, reporting failure as [`ReportError::SectionWriteFailure`].
    pub async fn try_write(&self, section: &Section, context: &str, mode: WriteMode) -> Result<String> {
        tracing::info!("Writing section ({:?}): {}", mode, section.name);

        let instructions = match mode {
            WriteMode::Research => {
                prompts::section_writer_instructions(&section.name, &section.description, context)
            }
            WriteMode::Synthesis => prompts::final_section_writer_instructions(
                &section.name,
                &section.description,
                context,
            ),
        };
        let messages = [
            ChatMessage::system(instructions),
            ChatMessage::user(prompts::SECTION_REQUEST),
        ];

        let content = self
            .invoker
            .invoke_text(&messages)
            .await
            .map_err(|e| ReportError::SectionWriteFailure {
                section: section.name.clone(),
                reason: e.to_string(),
            })?;

        match content.joined_text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(ReportError::SectionWriteFailure {
                section: section.name.clone(),
                reason: "response contained no text".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatResponse, ContentPart, LlmClient, MessageContent};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct PartsLlm(Vec<ContentPart>);

    #[async_trait]
    impl LlmClient for PartsLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> anyhow::Result<ChatResponse> {
            Ok(ChatResponse {
                content: Some(MessageContent::Parts(self.0.clone())),
                ..Default::default()
            })
        }
    }

    struct EchoTemplateLlm;

    #[async_trait]
    impl LlmClient for EchoTemplateLlm {
        async fn chat_completion(
            &self,
            _model: &str,
            messages: &[ChatMessage],
        ) -> anyhow::Result<ChatResponse> {
            let system = messages[0].text_content().unwrap_or_default();
            let kind = if system.contains("synthesizes information") {
                "synthesis"
            } else {
                "research"
            };
            Ok(ChatResponse::from_text(kind))
        }
    }

    fn writer(llm: impl LlmClient + 'static) -> SectionWriter {
        SectionWriter::new(StructuredInvoker::new(Arc::new(llm), "m"))
    }

    #[tokio::test]
    async fn test_concatenates_text_parts() {
        let w = writer(PartsLlm(vec![
            ContentPart::text("## CPU\n"),
            ContentPart::image_url("https://example.com/diagram.png"),
            ContentPart::text("Cores and caches."),
        ]));
        let section = Section::new("CPU", "Central processing units", true);

        let written = w.write(&section, "Sources: ...", WriteMode::Research).await;

        assert_eq!(written.content, "## CPU\nCores and caches.");
        assert_eq!(written.name, "CPU");
        assert!(section.content.is_empty());
    }

    #[tokio::test]
    async fn test_no_text_parts_yields_placeholder() {
        let w = writer(PartsLlm(vec![ContentPart::image_url("https://example.com/a.png")]));
        let section = Section::new("GPU", "Graphics processing units", true);

        let err = w.try_write(&section, "", WriteMode::Research).await.unwrap_err();
        assert!(matches!(err, ReportError::SectionWriteFailure { .. }));

        let written = w.write(&section, "", WriteMode::Research).await;
        assert_eq!(written.content, placeholder_content("GPU"));
        assert_eq!(written.content, "[Error: failed to write section 'GPU']");
    }

    #[tokio::test]
    async fn test_mode_selects_template() {
        let w = writer(EchoTemplateLlm);
        let section = Section::new("Introduction", "Overview", false);

        let research = w.write(&section, "ctx", WriteMode::Research).await;
        let synthesis = w.write(&section, "ctx", WriteMode::Synthesis).await;

        assert_eq!(research.content, "research");
        assert_eq!(synthesis.content, "synthesis");
    }
}
