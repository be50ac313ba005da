use crate::error::ServiceError;
use crate::traits::TableSummarizer;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const BACKEND: &str = "chat-completion";

const SYSTEM_PROMPT: &str = "You turn tables from public notices into plain sentences for search indexing.";

const TABLE_PROMPT: &str = "Rewrite the markdown table below as complete sentences. \
Write one sentence per data row, name every column value together with its column header, \
do not drop, round or invent any value, and answer with the sentences only.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completions endpoint authenticated with an `api-key` header.
pub struct ChatCompletionClient {
    endpoint: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl ChatCompletionClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            temperature: 0.2,
            max_tokens: 1_600,
            client: Client::new(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request<'a>(&self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn table_prompt(table_markdown: &str) -> String {
    format!("{TABLE_PROMPT}\n\n{table_markdown}")
}

fn first_completion(response: ChatResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ServiceError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "completion had no content".to_string(),
        })
}

#[async_trait]
impl TableSummarizer for ChatCompletionClient {
    async fn summarize(&self, table_markdown: &str) -> Result<String, ServiceError> {
        let prompt = table_prompt(table_markdown);
        let request = self.request(&prompt);

        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!("{status}: {body}"),
            });
        }

        first_completion(response.json().await?)
    }
}
