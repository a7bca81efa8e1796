use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Article metadata as returned by the external source, not yet deduplicated
/// against the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateArticle {
    pub journal: String,
    pub title: String,
    pub abstract_text: String,
    pub doi: Option<String>,
    pub url: String,
    pub published: NaiveDate,
}

impl CandidateArticle {
    /// Stable identity used for deduplication: the DOI when present, otherwise
    /// a journal+title+publication-date composite. The two key kinds never
    /// merge; an article first seen without a DOI stays under its composite
    /// key even if a DOI shows up later.
    pub fn natural_key(&self) -> String {
        match &self.doi {
            Some(doi) if !doi.trim().is_empty() => {
                format!("doi:{}", doi.trim().to_lowercase())
            }
            _ => format!("art:{}|{}|{}", self.journal, self.title, self.published),
        }
    }
}

/// A stored article. Immutable after creation except for its attached
/// analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: i64,
    pub natural_key: String,
    pub journal: String,
    pub title: String,
    pub abstract_text: String,
    pub doi: Option<String>,
    pub url: String,
    pub published: NaiveDate,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Succeeded,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Succeeded => "succeeded",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AnalysisStatus::Pending),
            "succeeded" => Some(AnalysisStatus::Succeeded),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

/// The current scoring result for one article. At most one exists per article
/// at any time; re-analysis replaces it atomically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub status: AnalysisStatus,
    /// Relevance in [0, 10]. `None` whenever status is not `Succeeded`.
    pub score: Option<f64>,
    pub rationale: String,
    pub summary: Option<String>,
    pub model: String,
    pub analyzed_at: DateTime<Utc>,
    /// Raw LLM output retained for diagnosis when score extraction failed.
    pub raw_response: Option<String>,
}

impl Analysis {
    pub fn succeeded(
        score: f64,
        rationale: String,
        summary: Option<String>,
        model: String,
    ) -> Self {
        Self {
            status: AnalysisStatus::Succeeded,
            score: Some(score),
            rationale,
            summary,
            model,
            analyzed_at: Utc::now(),
            raw_response: None,
        }
    }

    pub fn failed(reason: String, raw_response: Option<String>, model: String) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            score: None,
            rationale: reason,
            summary: None,
            model,
            analyzed_at: Utc::now(),
            raw_response,
        }
    }
}

/// Selection filter for the analysis coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisFilter {
    /// Articles with no current analysis, or whose analysis failed.
    Pending,
    /// Re-analysis: every article, optionally narrowed to one publication
    /// date. Already-succeeded analyses are replaced on commit.
    Reanalyze { date: Option<NaiveDate> },
}

/// Per-journal outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalOutcome {
    Ingested { found: usize, new: usize },
    Failed(String),
}

/// Summary returned by the ingestion coordinator instead of raising on
/// per-journal failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSummary {
    pub journals: Vec<(String, JournalOutcome)>,
}

impl FetchSummary {
    pub fn total_new(&self) -> usize {
        self.journals
            .iter()
            .map(|(_, o)| match o {
                JournalOutcome::Ingested { new, .. } => *new,
                JournalOutcome::Failed(_) => 0,
            })
            .sum()
    }

    pub fn failed_journals(&self) -> Vec<&str> {
        self.journals
            .iter()
            .filter_map(|(name, o)| match o {
                JournalOutcome::Failed(_) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Per-batch outcome of one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisRunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportEntry {
    pub article: Article,
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportStats {
    pub count: usize,
    pub mean_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    /// Entry counts per integer score bucket 0..=10 (scores are floored).
    pub distribution: Vec<u32>,
}

/// Aggregated report for one calendar date. Entries and stats are fully
/// determined by the store state; only `generated_at` carries wall-clock
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
    pub stats: ReportStats,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("metadata source returned malformed data: {0}")]
    Metadata(String),

    #[error("LLM endpoint error: {0}")]
    Llm(String),

    #[error("article {id} no longer exists")]
    Conflict { id: i64 },

    #[error("store returned malformed row: {0}")]
    Corrupt(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Transient errors are worth retrying with backoff; everything else is
    /// either a per-item semantic failure or systemic.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Http(_) | PipelineError::Llm(_))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(doi: Option<&str>) -> CandidateArticle {
        CandidateArticle {
            journal: "Nature".to_string(),
            title: "A Title".to_string(),
            abstract_text: "An abstract.".to_string(),
            doi: doi.map(|s| s.to_string()),
            url: "https://doi.org/10.1/x".to_string(),
            published: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn natural_key_prefers_doi() {
        let c = candidate(Some("10.1000/ABC"));
        assert_eq!(c.natural_key(), "doi:10.1000/abc");
    }

    #[test]
    fn natural_key_falls_back_to_composite() {
        let c = candidate(None);
        assert_eq!(c.natural_key(), "art:Nature|A Title|2024-03-01");
        let blank = candidate(Some("   "));
        assert_eq!(blank.natural_key(), c.natural_key());
    }

    #[test]
    fn status_round_trips() {
        for s in [
            AnalysisStatus::Pending,
            AnalysisStatus::Succeeded,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(AnalysisStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(AnalysisStatus::parse("bogus"), None);
    }
}
