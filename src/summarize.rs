use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::TOPIC_PLACEHOLDER;
use crate::domain::{PaperRecord, Query};
use crate::error::KiraError;
use crate::output::render_digest;

pub const CREDENTIAL_PREFIX: &str = "sk-";
pub const MAX_TOKENS: u32 = 800;
pub const TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Synthesis {
    Completed(String),
    NoCredential,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: &str, prompt: String) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<String, KiraError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, KiraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-papers/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::CompletionTransport(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| KiraError::CompletionTransport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    #[instrument(skip(self, request, api_key), fields(model = %request.model))]
    async fn complete(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<String, KiraError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .header(CONTENT_TYPE, "application/json")
            .timeout(Duration::from_secs(120))
            .json(request)
            .send()
            .await
            .map_err(|err| KiraError::CompletionTransport(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KiraError::CompletionStatus {
                status,
                message: completion_error_message(&body),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|err| KiraError::CompletionTransport(err.to_string()))?;
        debug!(bytes = body.len(), "completion response received");
        let value: Value = serde_json::from_str(&body).map_err(|_| KiraError::EmptyCompletion)?;
        extract_completion(&value).ok_or(KiraError::EmptyCompletion)
    }
}

pub fn extract_completion(body: &Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .filter(|content| !content.trim().is_empty())
        .map(str::to_string)
}

/// `error.message` from an error reply, or a generic message when the body
/// is not the service's JSON error shape.
pub fn completion_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")?
                .get("message")?
                .as_str()
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "no summary returned".to_string())
}

pub fn has_valid_credential(credential: Option<&str>) -> bool {
    credential.is_some_and(|key| key.starts_with(CREDENTIAL_PREFIX))
}

/// Template with its first `{topic}` substituted, followed by the digest of
/// `records` when there are any.
pub fn build_prompt(topic: &Query, records: &[PaperRecord], template: &str) -> String {
    let head = template.replacen(TOPIC_PLACEHOLDER, topic.as_str(), 1);
    if records.is_empty() {
        return head;
    }
    format!("{head}\n\n{}", render_digest(records))
}

pub struct SummaryDispatcher<'a, L: CompletionClient + ?Sized> {
    client: &'a L,
    model: String,
}

impl<'a, L: CompletionClient + ?Sized> SummaryDispatcher<'a, L> {
    pub fn new(client: &'a L, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub async fn summarize(
        &self,
        topic: &Query,
        records: &[PaperRecord],
        template: &str,
        credential: Option<&str>,
    ) -> Result<Synthesis, KiraError> {
        let Some(api_key) = credential.filter(|key| key.starts_with(CREDENTIAL_PREFIX)) else {
            info!("no valid completion credential, skipping synthesis");
            return Ok(Synthesis::NoCredential);
        };
        let request = CompletionRequest::new(&self.model, build_prompt(topic, records, template));
        let text = self.client.complete(&request, api_key).await?;
        info!(chars = text.len(), "synthesis completed");
        Ok(Synthesis::Completed(text))
    }
}
