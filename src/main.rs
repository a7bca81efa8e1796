use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use pubwatch::{
    render, AnalysisCoordinator, AnalysisFilter, AppConfig, ArticleStore, CrossrefClient,
    IngestCoordinator, JournalOutcome, OllamaClient, RelevanceAnalyzer, ReportAggregator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "pubwatch", version, about = "Journal monitoring and relevance analysis")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "pubwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new articles from the configured journals.
    Fetch,
    /// Analyze articles that have no successful analysis yet.
    Analyze {
        /// Re-analyze articles that already have a result.
        #[arg(long)]
        reanalyze: bool,
        /// Restrict re-analysis to one publication date (YYYY-MM-DD).
        #[arg(long, requires = "reanalyze")]
        date: Option<NaiveDate>,
    },
    /// Generate and persist the report for a date.
    Report {
        /// Report date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Fetch, analyze, and report in one pass.
    Run {
        #[arg(long)]
        reanalyze: bool,
    },
    /// Show one article and its current analysis by id.
    Show { id: i64 },
    /// List recent articles with their relevance scores.
    List {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long, default_value_t = 0.0)]
        min_relevance: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let store = Arc::new(ArticleStore::open(&config.database_path).await?);

    match cli.command {
        Command::Fetch => {
            fetch(&config, store).await?;
        }
        Command::Analyze { reanalyze, date } => {
            let filter = if reanalyze {
                AnalysisFilter::Reanalyze { date }
            } else {
                AnalysisFilter::Pending
            };
            analyze(&config, store, &filter).await?;
        }
        Command::Report { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            report(&config, store, date).await?;
        }
        Command::Run { reanalyze } => {
            fetch(&config, store.clone()).await?;
            let filter = if reanalyze {
                AnalysisFilter::Reanalyze { date: None }
            } else {
                AnalysisFilter::Pending
            };
            analyze(&config, store.clone(), &filter).await?;
            report(&config, store, Utc::now().date_naive()).await?;
        }
        Command::Show { id } => {
            show(store, id).await?;
        }
        Command::List {
            days,
            min_relevance,
        } => {
            list(store, days, min_relevance).await?;
        }
    }

    Ok(())
}

async fn fetch(config: &AppConfig, store: Arc<ArticleStore>) -> anyhow::Result<()> {
    let source = Arc::new(CrossrefClient::new(&config.http, config.retry)?);
    let coordinator = IngestCoordinator::new(store, source, config.clone());
    let summary = coordinator.run(Utc::now().date_naive()).await?;

    for (journal, outcome) in &summary.journals {
        match outcome {
            JournalOutcome::Ingested { found, new } => {
                println!("{journal}: {found} found, {new} new");
            }
            JournalOutcome::Failed(reason) => {
                warn!("{journal}: fetch failed ({reason})");
                println!("{journal}: FAILED ({reason})");
            }
        }
    }
    println!("Fetch complete: {} new article(s).", summary.total_new());
    Ok(())
}

async fn analyze(
    config: &AppConfig,
    store: Arc<ArticleStore>,
    filter: &AnalysisFilter,
) -> anyhow::Result<()> {
    let llm = Arc::new(OllamaClient::new(&config.llm, config.http.timeout_seconds)?);
    let analyzer = RelevanceAnalyzer::new(
        llm,
        config.interests.clone(),
        config.retry,
        config.llm.summary_min_score,
    );
    let coordinator = AnalysisCoordinator::new(store, analyzer);
    let summary = coordinator.run(filter).await?;

    println!(
        "Analysis complete: {} attempted, {} succeeded, {} failed.",
        summary.attempted, summary.succeeded, summary.failed
    );
    Ok(())
}

async fn report(config: &AppConfig, store: Arc<ArticleStore>, date: NaiveDate) -> anyhow::Result<()> {
    let aggregator = ReportAggregator::new(store.clone(), config.min_relevance);
    let report = aggregator.generate(date).await?;
    let body = render::render_markdown(&report);

    store
        .save_report(report.date, report.generated_at, &body)
        .await?;
    let path = render::write_report(&config.reports_dir, &report, &body)?;

    println!("{body}");
    println!("Report written to {}", path.display());
    Ok(())
}

async fn show(store: Arc<ArticleStore>, id: i64) -> anyhow::Result<()> {
    let Some(article) = store.get_article(id).await? else {
        println!("No article with id {id}.");
        return Ok(());
    };

    println!("{} [{}]", article.title, article.journal);
    println!("Published: {}", article.published);
    if let Some(doi) = &article.doi {
        println!("DOI: {doi}");
    }
    if !article.url.is_empty() {
        println!("URL: {}", article.url);
    }
    println!("\n{}\n", article.abstract_text);

    match store.get_analysis(id).await? {
        Some(analysis) => {
            match analysis.score {
                Some(score) => println!("Relevance: {score:.1}/10 ({})", analysis.model),
                None => println!("Analysis failed ({})", analysis.model),
            }
            println!("{}", analysis.rationale);
            if let Some(summary) = &analysis.summary {
                println!("\nSummary: {summary}");
            }
        }
        None => println!("Not analyzed yet."),
    }
    Ok(())
}

async fn list(store: Arc<ArticleStore>, days: u32, min_relevance: f64) -> anyhow::Result<()> {
    let rows = store
        .list_recent(days, min_relevance, Utc::now().date_naive())
        .await?;

    if rows.is_empty() {
        println!("No articles in the last {days} day(s).");
        return Ok(());
    }
    for (article, analysis) in &rows {
        let score = match analysis.as_ref().and_then(|a| a.score) {
            Some(score) => format!("{score:.1}"),
            None => "-".to_string(),
        };
        println!(
            "{}  {:>4}  [{}] {}",
            article.published, score, article.journal, article.title
        );
    }
    println!("{} article(s).", rows.len());
    Ok(())
}
