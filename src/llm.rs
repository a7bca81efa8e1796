use crate::config::LlmConfig;
use crate::types::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Opaque text-in/text-out inference capability. One call is one network
/// round-trip; retry policy lives with the caller.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> String;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Ollama `/api/generate` client.
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig, timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.host);
        debug!("calling {} with model {}", url, self.model);

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Llm(format!("HTTP {status}: {body}")));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response)
    }
}

/// One scripted reply per `generate` call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Transient(String),
}

impl ScriptedReply {
    pub fn text(s: &str) -> Self {
        ScriptedReply::Text(s.to_string())
    }
}

/// Scripted client for tests: pops replies in order and fails once the
/// script runs out.
pub struct ScriptedLlm {
    model: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            model: "scripted".to_string(),
            replies: Mutex::new(replies.into()),
        }
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        let reply = self.replies.lock().await.pop_front();
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Transient(reason)) => Err(PipelineError::Llm(reason)),
            None => Err(PipelineError::Llm("script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_pops_in_order() {
        let llm = ScriptedLlm::new(vec![
            ScriptedReply::text("first"),
            ScriptedReply::Transient("down".to_string()),
        ]);

        assert_eq!(llm.generate("p").await.unwrap(), "first");
        let err = llm.generate("p").await.unwrap_err();
        assert!(err.is_transient());
        assert!(llm.generate("p").await.is_err());
    }

    #[test]
    fn ollama_client_normalizes_host() {
        let config = LlmConfig {
            host: "http://localhost:11434/".to_string(),
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config, 30).unwrap();
        assert_eq!(client.host, "http://localhost:11434");
        assert_eq!(client.model_name(), "llama3.2");
    }
}
