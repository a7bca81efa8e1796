use crate::types::{Report, Result};
use std::path::{Path, PathBuf};

/// Render a report as Markdown. Output is fully determined by the report
/// value; two reports with equal entries and stats render the same body.
pub fn render_markdown(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Publication report for {}\n\n", report.date));
    out.push_str(&format!(
        "Generated at {}.\n\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    if report.entries.is_empty() {
        out.push_str("No publications met the relevance threshold.\n");
        return out;
    }

    out.push_str(&format!(
        "{} publication(s); mean relevance {:.1} (min {:.1}, max {:.1}).\n\n",
        report.stats.count, report.stats.mean_score, report.stats.min_score, report.stats.max_score
    ));

    for (index, entry) in report.entries.iter().enumerate() {
        out.push_str(&format!("## {}. {}\n\n", index + 1, entry.article.title));
        if let Some(score) = entry.analysis.score {
            out.push_str(&format!(
                "**{}** | relevance {score:.1}/10",
                entry.article.journal
            ));
        } else {
            out.push_str(&format!("**{}**", entry.article.journal));
        }
        if !entry.article.url.is_empty() {
            out.push_str(&format!(" | <{}>", entry.article.url));
        }
        out.push_str("\n\n");
        if let Some(summary) = &entry.analysis.summary {
            out.push_str(summary);
            out.push_str("\n\n");
        }
    }

    out
}

/// Write the rendered body to `reports_dir/report_<date>.md`, creating the
/// directory as needed. Overwrites any prior file for the date.
pub fn write_report(reports_dir: &Path, report: &Report, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(reports_dir)?;
    let path = reports_dir.join(format!("report_{}.md", report.date));
    std::fs::write(&path, body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::compute_stats;
    use crate::types::{Analysis, Article, ReportEntry};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn report() -> Report {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let entries = vec![
            ReportEntry {
                article: Article {
                    id: 1,
                    natural_key: "doi:10.1/a".to_string(),
                    journal: "Ocean Science".to_string(),
                    title: "Overturning variability".to_string(),
                    abstract_text: "A".to_string(),
                    doi: Some("10.1/a".to_string()),
                    url: "https://doi.org/10.1/a".to_string(),
                    published: date,
                    fetched_at: Utc.with_ymd_and_hms(2024, 3, 6, 8, 0, 0).unwrap(),
                },
                analysis: Analysis {
                    analyzed_at: Utc.with_ymd_and_hms(2024, 3, 6, 9, 0, 0).unwrap(),
                    ..Analysis::succeeded(
                        8.0,
                        "on topic".to_string(),
                        Some("Measures the overturning.".to_string()),
                        "m".to_string(),
                    )
                },
            },
        ];
        let stats = compute_stats(&entries);
        Report {
            date,
            generated_at: Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap(),
            entries,
            stats,
        }
    }

    #[test]
    fn rendering_is_deterministic() {
        let r = report();
        assert_eq!(render_markdown(&r), render_markdown(&r));
    }

    #[test]
    fn rendered_body_lists_entries_with_scores() {
        let body = render_markdown(&report());
        assert!(body.contains("# Publication report for 2024-03-05"));
        assert!(body.contains("## 1. Overturning variability"));
        assert!(body.contains("relevance 8.0/10"));
        assert!(body.contains("Measures the overturning."));
    }

    #[test]
    fn empty_report_says_so() {
        let mut r = report();
        r.entries.clear();
        r.stats = compute_stats(&r.entries);
        let body = render_markdown(&r);
        assert!(body.contains("No publications met the relevance threshold."));
    }
}
