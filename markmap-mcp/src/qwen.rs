//! DashScope (Qwen) text expansion client.
//!
//! One call to the OpenAI-compatible chat completions endpoint per request;
//! the first choice's message content is returned as Markdown.

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use markmap_core::contract::{ExpandError, Expander};

pub const DEFAULT_ENDPOINT: &str = "https://dashscope.aliyuncs.com";
pub const DEFAULT_MODEL: &str = "qwen3-235b-a22b-thinking-2507";
const COMPLETIONS_PATH: &str = "/compatible-mode/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a mind-map content assistant. Turn the user's input into structured Markdown suited for a mind map.

Rules:
1. Use Markdown headings (#, ##, ###) for hierarchy
2. Use lists (- or 1.) for sibling points
3. Keep the content logical and layered
4. The result must read as a tree
5. Return only the Markdown, with no other commentary

Example:
# Topic
## Branch 1
- Point 1
- Point 2
## Branch 2
### Branch 2.1
- Detail";

#[derive(Debug, Error)]
pub enum QwenError {
    #[error("Qwen request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Qwen API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse Qwen response: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Qwen response contained no message content")]
    EmptyResponse,
}

#[derive(Clone)]
pub struct QwenConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

impl std::fmt::Debug for QwenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QwenConfig")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct QwenClient {
    config: QwenConfig,
    http: reqwest::Client,
}

impl QwenClient {
    pub fn new(config: QwenConfig) -> Self {
        info!(model = %config.model, endpoint = %config.endpoint, "Initialised Qwen client");
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub async fn generate_markdown(&self, text: &str) -> Result<String, QwenError> {
        let preview: String = text.chars().take(50).collect();
        info!(input = %preview, "Requesting Markdown from Qwen");

        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.7,
            max_tokens: 4000,
        };
        let url = format!(
            "{}{COMPLETIONS_PATH}",
            self.config.endpoint.trim_end_matches('/')
        );

        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            error!(status = status.as_u16(), "Qwen API request failed");
            return Err(QwenError::Status {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&raw)?;
        let markdown = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or(QwenError::EmptyResponse)?;

        info!(chars = markdown.chars().count(), "Qwen returned Markdown");
        Ok(markdown)
    }
}

#[async_trait]
impl Expander for QwenClient {
    async fn expand(&self, text: &str) -> Result<String, ExpandError> {
        self.generate_markdown(text).await.map_err(|e| {
            error!(error = %e, "Text expansion failed");
            Box::new(e) as ExpandError
        })
    }
}
