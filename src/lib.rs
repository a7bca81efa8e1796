//! Incremental pipeline that watches scientific journals, scores new articles
//! against an interest profile with a local LLM, and aggregates the results
//! into dated reports. Every stage is re-runnable: ingestion deduplicates by
//! natural key, analysis replaces results atomically, and reports are a pure
//! function of store state.

pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod crossref;
pub mod ingest;
pub mod llm;
pub mod render;
pub mod report;
pub mod store;
pub mod types;

pub use analysis::AnalysisCoordinator;
pub use analyzer::RelevanceAnalyzer;
pub use config::AppConfig;
pub use crossref::{CrossrefClient, MetadataSource};
pub use ingest::IngestCoordinator;
pub use llm::{LlmClient, OllamaClient};
pub use report::ReportAggregator;
pub use store::ArticleStore;
pub use types::{
    Analysis, AnalysisFilter, AnalysisRunSummary, AnalysisStatus, Article, CandidateArticle,
    FetchSummary, JournalOutcome, PipelineError, Report, ReportEntry, ReportStats, Result,
};
