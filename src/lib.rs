//! # Report Agent
//!
//! Generates multi-section research reports with a language model and a web
//! search provider.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │        ReportOrchestrator        │
//!        └───────┬───────────────┬──────────┘
//!                │               │
//!                ▼               ▼
//!        ┌──────────────┐  ┌──────────────┐
//!        │ ReportPlanner│  │ SectionWriter│
//!        └──────┬───────┘  └──────┬───────┘
//!               ▼                 │
//!        ┌──────────────┐         │
//!        │  Researcher  │         │
//!        └──┬────────┬──┘         │
//!           ▼        ▼            ▼
//!     SearchClient  StructuredInvoker ──▶ LlmClient
//! ```
//!
//! ## Report Flow
//! 1. Discovery research over the whole topic, then outline generation
//! 2. Research and write every research section concurrently
//! 3. Write introduction/conclusion style sections from the completed ones
//! 4. Assemble sections in outline order
//!
//! ## Modules
//! - `llm`: LLM client trait, OpenRouter client, retrying structured invoker
//! - `search`: search client trait and Tavily client
//! - `sources`: source deduplication and context formatting
//! - `research`: query generation and concurrent search
//! - `report`: planner, writer and orchestrator
//! - `config`: environment and file configuration

pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod report;
pub mod research;
pub mod search;
pub mod sources;

pub use config::Config;
pub use error::ReportError;
pub use report::{Report, ReportOrchestrator, ReportStructure, Section};
