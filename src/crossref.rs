use crate::config::{HttpConfig, JournalConfig, RetryConfig};
use crate::types::{CandidateArticle, PipelineError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const CROSSREF_WORKS_URL: &str = "https://api.crossref.org/works";

/// Titles carrying any of these are front matter, not research output.
const NON_RESEARCH_KEYWORDS: &[&str] = &[
    "issue information",
    "table of contents",
    "cover image",
    "editorial board",
    "masthead",
    "front matter",
    "back matter",
    "volume information",
    "errata",
    "correction",
];

/// Source of article metadata for one journal and time window. The pipeline
/// only depends on this contract, never on the wire protocol.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn source_name(&self) -> String;

    /// Candidate articles for `journal` published on or after `from`.
    async fn fetch_window(
        &self,
        journal: &JournalConfig,
        from: NaiveDate,
    ) -> Result<Vec<CandidateArticle>>;
}

/// Crossref `/works` client, filtering by ISSN and publication window.
pub struct CrossrefClient {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    message: Message,
}

#[derive(Debug, Deserialize, Default)]
struct Message {
    #[serde(default)]
    items: Vec<Work>,
}

#[derive(Debug, Deserialize)]
struct Work {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    published: Option<PartialDate>,
}

#[derive(Debug, Deserialize)]
struct PartialDate {
    // Crossref emits partial dates and occasionally nulls inside the parts.
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CrossrefClient {
    pub fn new(http: &HttpConfig, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: Url::parse(CROSSREF_WORKS_URL)?,
            retry,
        })
    }

    fn request_url(&self, journal: &JournalConfig, from: NaiveDate) -> Url {
        let filter = format!(
            "issn:{},from-pub-date:{},has-abstract:true",
            journal.issn, from
        );
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("filter", &filter)
            .append_pair("select", "DOI,title,abstract,published")
            .append_pair("sort", "published")
            .append_pair("order", "desc")
            .append_pair("rows", "100");
        url
    }

    async fn get_with_retry(&self, url: Url) -> Result<String> {
        let delay = Duration::from_secs(self.retry.initial_delay_secs);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: delay,
            initial_interval: delay,
            max_interval: delay * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let outcome = async {
                let response = self
                    .client
                    .get(url.clone())
                    .send()
                    .await?
                    .error_for_status()?;
                Ok::<String, PipelineError>(response.text().await?)
            }
            .await;

            match outcome {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let wait = backoff.next_backoff().unwrap_or(delay);
                    warn!(
                        "metadata attempt {attempt}/{} failed ({e}), retrying in {wait:?}",
                        self.retry.max_retries
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MetadataSource for CrossrefClient {
    fn source_name(&self) -> String {
        "crossref".to_string()
    }

    async fn fetch_window(
        &self,
        journal: &JournalConfig,
        from: NaiveDate,
    ) -> Result<Vec<CandidateArticle>> {
        let url = self.request_url(journal, from);
        debug!("querying {url}");
        let body = self.get_with_retry(url).await?;
        let envelope = parse_envelope(&body, &journal.name)?;

        let fallback_date = Utc::now().date_naive();
        let candidates: Vec<CandidateArticle> = envelope
            .message
            .items
            .into_iter()
            .filter_map(|work| extract_candidate(work, &journal.name, fallback_date))
            .collect();

        debug!("{}: {} candidates", journal.name, candidates.len());
        Ok(candidates)
    }
}

/// A body that does not deserialize is a per-journal metadata failure, not a
/// retryable transport error.
fn parse_envelope(body: &str, journal_name: &str) -> Result<Envelope> {
    serde_json::from_str(body).map_err(|e| PipelineError::Metadata(format!("{journal_name}: {e}")))
}

fn extract_candidate(
    work: Work,
    journal_name: &str,
    fallback_date: NaiveDate,
) -> Option<CandidateArticle> {
    let title = work
        .title
        .into_iter()
        .find(|t| !t.trim().is_empty())?
        .trim()
        .to_string();

    let lowered = title.to_lowercase();
    if NON_RESEARCH_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return None;
    }

    let doi = work.doi.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    let url = doi
        .as_deref()
        .map(|d| format!("https://doi.org/{d}"))
        .unwrap_or_default();
    let published = work
        .published
        .and_then(|p| parse_date_parts(&p.date_parts))
        .unwrap_or(fallback_date);

    Some(CandidateArticle {
        journal: journal_name.to_string(),
        title,
        abstract_text: work
            .abstract_text
            .map(|a| a.trim().to_string())
            .unwrap_or_default(),
        doi,
        url,
        published,
    })
}

fn parse_date_parts(date_parts: &[Vec<Option<i32>>]) -> Option<NaiveDate> {
    let parts = date_parts.first()?;
    let year = (*parts.first()?)?;
    let month = parts.get(1).copied().flatten().unwrap_or(1);
    let day = parts.get(2).copied().flatten().unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "message": {
            "items": [
                {
                    "DOI": "10.5194/os-20-1-2024",
                    "title": ["Decadal variability of the overturning circulation"],
                    "abstract": "<jats:p>We examine decadal variability.</jats:p>",
                    "published": { "date-parts": [[2024, 3, 5]] }
                },
                {
                    "DOI": "10.5194/os-20-2-2024",
                    "title": ["Issue Information"],
                    "abstract": "n/a",
                    "published": { "date-parts": [[2024, 3]] }
                },
                {
                    "title": [],
                    "published": { "date-parts": [[2024]] }
                }
            ]
        }
    }"#;

    fn fallback() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn malformed_body_is_a_metadata_error() {
        let err = parse_envelope("{\"message\": 3}", "Ocean Science").unwrap_err();
        match err {
            PipelineError::Metadata(reason) => assert!(reason.starts_with("Ocean Science")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!parse_envelope("not json", "J").unwrap_err().is_transient());
    }

    #[test]
    fn extracts_research_items_only() {
        let envelope: Envelope = parse_envelope(SAMPLE, "Ocean Science").unwrap();
        let candidates: Vec<CandidateArticle> = envelope
            .message
            .items
            .into_iter()
            .filter_map(|w| extract_candidate(w, "Ocean Science", fallback()))
            .collect();

        // Front matter and the untitled item are dropped.
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.doi.as_deref(), Some("10.5194/os-20-1-2024"));
        assert_eq!(c.url, "https://doi.org/10.5194/os-20-1-2024");
        assert_eq!(c.published, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(c.journal, "Ocean Science");
    }

    #[test]
    fn partial_dates_default_month_and_day() {
        assert_eq!(
            parse_date_parts(&[vec![Some(2024), Some(3)]]),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            parse_date_parts(&[vec![Some(2024)]]),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        assert_eq!(parse_date_parts(&[vec![None]]), None);
        assert_eq!(parse_date_parts(&[]), None);
    }

    #[test]
    fn request_url_carries_window_filter() {
        let client = CrossrefClient::new(&HttpConfig::default(), RetryConfig::default()).unwrap();
        let journal = JournalConfig {
            name: "Ocean Science".to_string(),
            issn: "1812-0792".to_string(),
            lookback_days: None,
        };
        let url = client.request_url(&journal, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let query = url.query().unwrap();
        assert!(query.contains("issn%3A1812-0792"));
        assert!(query.contains("from-pub-date%3A2024-03-01"));
        assert!(query.contains("has-abstract%3Atrue"));
        assert!(query.contains("rows=100"));
    }
}
