//! OpenAI-compatible HTTP client.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    Completer, Completion, ContentAnalyzer, Embedder, ImageDescription, ImageInput, ServiceError,
    TextExtraction,
};
use crate::local::AppConfig;

const OCR_PROMPT: &str = "Extract all text visible in this image, preserving line breaks. \
Respond with a JSON object: {\"text\": string, \"confidence\": number between 0 and 1}. \
Use an empty string when there is no text.";

const DESCRIBE_PROMPT: &str = "Describe this image in detail: objects, people, scenery, \
colors and any visible text. Respond with a JSON object: {\"description\": string, \
\"labels\": array of short strings, \"confidence\": number between 0 and 1}.";

/// Client for `/v1/embeddings` and `/v1/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    embedding_model: String,
    chat_model: String,
    vision_model: String,
}

impl OpenAiClient {
    pub fn new(config: &AppConfig, api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            vision_model: config.vision_model.clone(),
        }
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "calling model service");

        let response = self
            .http
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        Ok(response.json::<T>().await?)
    }

    async fn chat(&self, body: Value) -> Result<String, ServiceError> {
        let response: ChatResponse = self.post("/v1/chat/completions", &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::InvalidResponse("no completion returned".to_string()))
    }

    async fn vision_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        image: ImageInput<'_>,
    ) -> Result<T, ServiceError> {
        let data_url = format!(
            "data:{};base64,{}",
            image.mime_type,
            BASE64.encode(image.bytes)
        );
        let content = self
            .chat(json!({
                "model": self.vision_model,
                "response_format": { "type": "json_object" },
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": prompt },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ],
                }],
            }))
            .await?;

        Ok(serde_json::from_str(strip_code_fence(&content))?)
    }
}

impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response: EmbeddingResponse = self
            .post(
                "/v1/embeddings",
                &json!({
                    "model": self.embedding_model,
                    "input": texts,
                }),
            )
            .await?;

        if response.data.len() != texts.len() {
            return Err(ServiceError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

impl Completer for OpenAiClient {
    async fn complete(&self, request: &Completion) -> Result<String, ServiceError> {
        self.chat(json!({
            "model": self.chat_model,
            "temperature": request.temperature,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
        }))
        .await
    }
}

impl ContentAnalyzer for OpenAiClient {
    async fn extract_text(&self, image: ImageInput<'_>) -> Result<TextExtraction, ServiceError> {
        self.vision_json(OCR_PROMPT, image).await
    }

    async fn describe_image(&self, image: ImageInput<'_>) -> Result<ImageDescription, ServiceError> {
        self.vision_json(DESCRIBE_PROMPT, image).await
    }
}

/// Map a non-success status to an error. Only rate limiting is retryable.
fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let detail = format!("{}: {}", status, body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("rate_limit_exceeded") {
        ServiceError::Throttled(detail)
    } else {
        ServiceError::Unavailable(detail)
    }
}

/// Models sometimes wrap JSON in a markdown fence despite `json_object`.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
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
    content: Option<String>,
}
