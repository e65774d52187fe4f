//! Answer engine collaborator: a hosted chat-completion capability.
//!
//! The [`AnswerEngine`] trait is the seam between the QA session manager
//! and the outside world; tests substitute their own implementation. The
//! shipped implementation targets an OpenAI-compatible
//! `/v1/chat/completions` endpoint with the credential taken from the
//! `OPENAI_API_KEY` environment variable. A missing credential is not an
//! error — it selects the keyword fallback path upstream.
//!
//! Any transport fault or non-success status is a hard
//! [`DomainError::AnswerEngine`] failure of the calling operation.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::QaConfig;
use crate::error::{DomainError, Result};

const SYSTEM_PROMPT: &str = "You are a helpful document assistant. Answer questions based \
    on the provided document context. If you cannot find the answer in the context, \
    say so clearly.";

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[async_trait]
pub trait AnswerEngine: Send + Sync {
    /// Answer `question` constrained to `context`.
    async fn answer(&self, question: &str, context: &str) -> Result<String>;
}

pub struct OpenAiEngine {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiEngine {
    /// Build an engine from configuration, or `None` when no credential is
    /// present in the environment.
    pub fn from_env(config: &QaConfig) -> Result<Option<Self>> {
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) if !key.trim().is_empty() => key.trim().to_string(),
            _ => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::AnswerEngine(e.to_string()))?;

        Ok(Some(Self {
            api_key,
            model: config.model.clone(),
            client,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl AnswerEngine for OpenAiEngine {
    async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!("Document context:\n{context}\n\nQuestion: {question}"),
                },
            ],
            "max_tokens": 1000,
            "temperature": 0.3,
        });

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::AnswerEngine(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::AnswerEngine(format!(
                "completion endpoint returned {status}"
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| DomainError::AnswerEngine(e.to_string()))?;

        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| DomainError::AnswerEngine("response has no choices".to_string()))
    }
}
