use crate::store::ArticleStore;
use crate::types::{Report, ReportEntry, ReportStats, Result};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

/// Builds the dated report from whatever succeeded analyses exist at call
/// time. Apart from the generation timestamp, the result is a pure function
/// of the store contents, so regenerating is always safe.
pub struct ReportAggregator {
    store: Arc<ArticleStore>,
    min_relevance: f64,
}

impl ReportAggregator {
    pub fn new(store: Arc<ArticleStore>, min_relevance: f64) -> Self {
        Self {
            store,
            min_relevance,
        }
    }

    pub async fn generate(&self, date: NaiveDate) -> Result<Report> {
        let entries: Vec<ReportEntry> = self
            .store
            .query_for_report(date, self.min_relevance)
            .await?
            .into_iter()
            .map(|(article, analysis)| ReportEntry { article, analysis })
            .collect();

        info!(
            "report for {date}: {} entries at threshold {:.1}",
            entries.len(),
            self.min_relevance
        );

        let stats = compute_stats(&entries);
        Ok(Report {
            date,
            generated_at: Utc::now(),
            entries,
            stats,
        })
    }
}

pub fn compute_stats(entries: &[ReportEntry]) -> ReportStats {
    let scores: Vec<f64> = entries.iter().filter_map(|e| e.analysis.score).collect();

    let mut distribution = vec![0u32; 11];
    for &score in &scores {
        let bucket = (score.floor() as usize).min(10);
        distribution[bucket] += 1;
    }

    let (mean_score, min_score, max_score) = if scores.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let sum: f64 = scores.iter().sum();
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (sum / scores.len() as f64, min, max)
    };

    ReportStats {
        count: entries.len(),
        mean_score,
        min_score,
        max_score,
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Analysis, Article};
    use chrono::NaiveDate;

    fn entry(score: f64) -> ReportEntry {
        ReportEntry {
            article: Article {
                id: 1,
                natural_key: "doi:10.1/x".to_string(),
                journal: "J".to_string(),
                title: "T".to_string(),
                abstract_text: "A".to_string(),
                doi: Some("10.1/x".to_string()),
                url: "https://doi.org/10.1/x".to_string(),
                published: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
                fetched_at: Utc::now(),
            },
            analysis: Analysis::succeeded(score, "r".to_string(), None, "m".to_string()),
        }
    }

    #[test]
    fn stats_over_empty_report_are_zeroed() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean_score, 0.0);
        assert_eq!(stats.distribution, vec![0; 11]);
    }

    #[test]
    fn stats_bucket_by_floored_score() {
        let entries = vec![entry(7.9), entry(7.0), entry(10.0), entry(3.5)];
        let stats = compute_stats(&entries);

        assert_eq!(stats.count, 4);
        assert_eq!(stats.min_score, 3.5);
        assert_eq!(stats.max_score, 10.0);
        assert!((stats.mean_score - 7.1).abs() < 1e-9);
        assert_eq!(stats.distribution[7], 2);
        assert_eq!(stats.distribution[10], 1);
        assert_eq!(stats.distribution[3], 1);
    }
}
