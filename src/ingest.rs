use crate::config::AppConfig;
use crate::crossref::MetadataSource;
use crate::store::ArticleStore;
use crate::types::{FetchSummary, JournalOutcome, PipelineError, Result};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::{info, warn};

/// Walks the configured journals, pulls each one's publication window from
/// the metadata source, and hands candidates to the store. A journal that
/// fails to fetch is recorded and skipped; the run keeps going. Store errors
/// abort the run, since nothing useful can be persisted past them.
pub struct IngestCoordinator {
    store: Arc<ArticleStore>,
    source: Arc<dyn MetadataSource>,
    config: AppConfig,
}

impl IngestCoordinator {
    pub fn new(store: Arc<ArticleStore>, source: Arc<dyn MetadataSource>, config: AppConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<FetchSummary> {
        let mut summary = FetchSummary::default();

        for journal in &self.config.journals {
            let lookback = self.config.lookback_for(journal);
            let from = today - Duration::days(i64::from(lookback));
            info!(
                "fetching {} via {} (since {from})",
                journal.name,
                self.source.source_name()
            );

            let candidates = match self.source.fetch_window(journal, from).await {
                Ok(candidates) => candidates,
                Err(e @ PipelineError::Database(_)) => return Err(e),
                Err(e) => {
                    warn!("fetch failed for {}: {e}", journal.name);
                    summary
                        .journals
                        .push((journal.name.clone(), JournalOutcome::Failed(e.to_string())));
                    continue;
                }
            };

            let found = candidates.len();
            let mut new = 0;
            for candidate in &candidates {
                let (_, is_new) = self.store.upsert_candidate(candidate).await?;
                if is_new {
                    new += 1;
                }
            }

            info!("{}: {found} candidates, {new} new", journal.name);
            summary
                .journals
                .push((journal.name.clone(), JournalOutcome::Ingested { found, new }));
        }

        Ok(summary)
    }
}
