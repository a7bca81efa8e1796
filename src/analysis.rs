use crate::analyzer::RelevanceAnalyzer;
use crate::store::ArticleStore;
use crate::types::{AnalysisFilter, AnalysisRunSummary, AnalysisStatus, PipelineError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives one analysis batch: selects eligible articles, analyzes them one at
/// a time, and commits every outcome, failed ones included, so progress
/// survives interruption. Only store errors abort the batch.
pub struct AnalysisCoordinator {
    store: Arc<ArticleStore>,
    analyzer: RelevanceAnalyzer,
}

impl AnalysisCoordinator {
    pub fn new(store: Arc<ArticleStore>, analyzer: RelevanceAnalyzer) -> Self {
        Self { store, analyzer }
    }

    pub async fn run(&self, filter: &AnalysisFilter) -> Result<AnalysisRunSummary> {
        let articles = self.store.list_pending_analysis(filter).await?;
        info!("{} articles selected for analysis", articles.len());

        let mut summary = AnalysisRunSummary::default();
        for article in &articles {
            summary.attempted += 1;
            let analysis = self.analyzer.analyze(article).await;
            let succeeded = analysis.status == AnalysisStatus::Succeeded;

            match self.store.commit_analysis(article.id, &analysis).await {
                Ok(()) => {
                    if succeeded {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                Err(PipelineError::Conflict { id }) => {
                    warn!("article {id} disappeared before its analysis was committed");
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "analysis run finished: {} attempted, {} succeeded, {} failed",
            summary.attempted, summary.succeeded, summary.failed
        );
        Ok(summary)
    }
}
