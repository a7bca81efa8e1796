use crate::types::{PipelineError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One monitored journal. The ISSN drives the metadata query; `lookback_days`
/// overrides the global window when set.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JournalConfig {
    pub name: String,
    pub issn: String,
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub host: String,
    pub temperature: f32,
    /// Summaries are only requested for articles scoring at least this high;
    /// lower scores keep their rationale but skip the second LLM round-trip.
    pub summary_min_score: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            host: "http://localhost:11434".to_string(),
            temperature: 0.2,
            summary_min_score: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    pub initial_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "pubwatch/0.1 (https://github.com/pubwatch/pubwatch)".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Resolved application configuration. Loaded once and handed to each
/// coordinator at construction; nothing reads configuration ambiently.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub reports_dir: PathBuf,
    pub interests: Vec<String>,
    pub journals: Vec<JournalConfig>,
    /// Global fetch window in days; journals may override.
    pub lookback_days: u32,
    /// Minimum relevance score for report inclusion.
    pub min_relevance: f64,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("pubwatch.db"),
            reports_dir: PathBuf::from("reports"),
            interests: Vec::new(),
            journals: Vec::new(),
            lookback_days: 10,
            min_relevance: 5.0,
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: AppConfig =
            toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.database_path = expand_home(config.database_path);
        config.reports_dir = expand_home(config.reports_dir);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=10.0).contains(&self.min_relevance) {
            return Err(PipelineError::Config(format!(
                "min_relevance must be in [0, 10], got {}",
                self.min_relevance
            )));
        }
        if self.lookback_days == 0 {
            return Err(PipelineError::Config(
                "lookback_days must be at least 1".to_string(),
            ));
        }
        for journal in &self.journals {
            if journal.name.trim().is_empty() {
                return Err(PipelineError::Config(
                    "journal entry with empty name".to_string(),
                ));
            }
            if journal.issn.trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "journal '{}' has no ISSN",
                    journal.name
                )));
            }
        }
        Ok(())
    }

    pub fn lookback_for(&self, journal: &JournalConfig) -> u32 {
        journal.lookback_days.unwrap_or(self.lookback_days)
    }
}

fn expand_home(path: PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let text = r#"
            database_path = "data/pubs.db"
            reports_dir = "data/reports"
            interests = ["ocean modelling", "sea ice"]
            lookback_days = 7
            min_relevance = 6.5

            [[journals]]
            name = "The Cryosphere"
            issn = "1994-0424"

            [[journals]]
            name = "Ocean Science"
            issn = "1812-0792"
            lookback_days = 3

            [llm]
            model = "mistral"

            [retry]
            max_retries = 1
        "#;
        let config = AppConfig::from_toml(text).unwrap();
        assert_eq!(config.journals.len(), 2);
        assert_eq!(config.min_relevance, 6.5);
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.llm.host, "http://localhost:11434");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.lookback_for(&config.journals[0]), 7);
        assert_eq!(config.lookback_for(&config.journals[1]), 3);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.lookback_days, 10);
        assert_eq!(config.min_relevance, 5.0);
        assert!(config.journals.is_empty());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = AppConfig::from_toml("min_relevance = 12.0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn rejects_journal_without_issn() {
        let text = r#"
            [[journals]]
            name = "Nameless"
            issn = ""
        "#;
        assert!(AppConfig::from_toml(text).is_err());
    }
}
