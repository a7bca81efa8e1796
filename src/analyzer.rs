use crate::config::RetryConfig;
use crate::llm::LlmClient;
use crate::types::{Analysis, Article, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Scores one article against the interest profile and produces a summary.
/// Never panics and never defaults a score: any outcome that is not a parsed
/// in-range number becomes a `failed` analysis carrying the raw response.
pub struct RelevanceAnalyzer {
    llm: Arc<dyn LlmClient>,
    interests: Vec<String>,
    retry: RetryConfig,
    summary_min_score: f64,
}

impl RelevanceAnalyzer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        interests: Vec<String>,
        retry: RetryConfig,
        summary_min_score: f64,
    ) -> Self {
        Self {
            llm,
            interests,
            retry,
            summary_min_score,
        }
    }

    /// The relevance and summary prompts are independent round-trips: a
    /// summary failure downgrades nothing, the score stands on its own.
    pub async fn analyze(&self, article: &Article) -> Analysis {
        let model = self.llm.model_name();

        if article.title.trim().is_empty() || article.abstract_text.trim().is_empty() {
            return Analysis::failed(
                "insufficient text: title or abstract missing".to_string(),
                None,
                model,
            );
        }

        let response = match self.generate_with_retry(&self.relevance_prompt(article)).await {
            Ok(text) => text,
            Err(e) => {
                warn!("relevance call failed for article {}: {}", article.id, e);
                return Analysis::failed(format!("relevance call failed: {e}"), None, model);
            }
        };

        let score = match parse_score(&response) {
            Some(score) => score,
            None => {
                warn!(
                    "no relevance score found in response for article {}",
                    article.id
                );
                return Analysis::failed(
                    "no relevance score found in response".to_string(),
                    Some(response),
                    model,
                );
            }
        };

        let summary = if score >= self.summary_min_score {
            match self
                .generate_with_retry(&self.summary_prompt(article, score))
                .await
            {
                Ok(text) => Some(text.trim().to_string()),
                Err(e) => {
                    warn!("summary call failed for article {}: {}", article.id, e);
                    None
                }
            }
        } else {
            debug!(
                "score {score:.1} below summary threshold {:.1}, skipping summary for article {}",
                self.summary_min_score, article.id
            );
            None
        };

        Analysis::succeeded(score, response.trim().to_string(), summary, model)
    }

    fn relevance_prompt(&self, article: &Article) -> String {
        let interests = self.interests.join(", ");
        format!(
            "You are screening scientific publications for a researcher whose \
             interests are: {interests}.\n\
             Rate the relevance of the following publication to those interests \
             on a scale from 0 to 10 and explain your rating briefly. Reply with \
             the score in the form N/10 followed by the explanation.\n\n\
             Journal: {}\nTitle: {}\nAbstract: {}\n",
            article.journal, article.title, article.abstract_text
        )
    }

    fn summary_prompt(&self, article: &Article, score: f64) -> String {
        format!(
            "Summarize what this publication does in one or two sentences. Be \
             extremely concise; do not repeat the title.\n\n\
             Journal: {}\nTitle: {}\nAbstract: {}\n\n\
             This publication was rated {score:.0}/10 for relevance.\n",
            article.journal, article.title, article.abstract_text
        )
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String> {
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
            match self.llm.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let wait = backoff.next_backoff().unwrap_or(delay);
                    warn!(
                        "LLM attempt {attempt}/{} failed ({e}), retrying in {wait:?}",
                        self.retry.max_retries
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Extract the relevance score from free-form model output.
///
/// Grammar: the first numeric literal (integer or decimal) whose value lies
/// in [0, 10], optionally the numerator of an `N/10` form. Denominators
/// (digits right after `/`), decimal tails (digits right after `.`), and
/// hyphen-prefixed digits (`llama-3`, negative numbers) are skipped. Returns
/// `None` when nothing matches; callers must treat that as a failure, not a
/// default score.
pub fn parse_score(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
        }

        let skipped = start > 0 && matches!(bytes[start - 1], b'/' | b'.' | b'-');
        if skipped {
            continue;
        }

        if let Ok(value) = text[start..i].parse::<f64>() {
            if (0.0..=10.0).contains(&value) {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_slash_ten_form() {
        assert_eq!(parse_score("I would rate this 8/10 because..."), Some(8.0));
        assert_eq!(parse_score("10/10, directly on topic"), Some(10.0));
        assert_eq!(parse_score("0/10 - unrelated"), Some(0.0));
    }

    #[test]
    fn parses_bare_numbers_and_decimals() {
        assert_eq!(parse_score("Relevance: 7"), Some(7.0));
        assert_eq!(parse_score("Score is 7.5 out of ten"), Some(7.5));
    }

    #[test]
    fn skips_out_of_range_and_denominators() {
        // 12 is out of range and the 10 is a denominator.
        assert_eq!(parse_score("12/10 hyperbole"), None);
        assert_eq!(parse_score("first 11, but truly 9/10"), Some(9.0));
    }

    #[test]
    fn skips_hyphenated_and_decimal_tails() {
        assert_eq!(parse_score("llama-3 says: 6"), Some(6.0));
        assert_eq!(parse_score("version 42.7.1 irrelevant"), None);
    }

    #[test]
    fn no_number_means_no_score() {
        assert_eq!(parse_score("highly relevant to your work"), None);
        assert_eq!(parse_score(""), None);
    }
}
