//! External model services: embeddings, chat completion and image analysis.
//!
//! Every trait method performs exactly one downstream call. Retrying is the
//! caller's business (see `ResilientInvoker`).

mod error;
mod openai;

pub use error::ServiceError;
pub use openai::OpenAiClient;

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Turns text into vectors.
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    fn embed(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>, ServiceError>> + Send;
}

/// A chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
}

/// Answers a prompt.
pub trait Completer: Send + Sync {
    fn complete(&self, request: &Completion) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

/// An image handed to the analyzer.
#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub bytes: &'a [u8],
    /// e.g. `image/png`
    pub mime_type: &'a str,
}

/// OCR result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextExtraction {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Vision description result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageDescription {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

/// OCR and vision description.
pub trait ContentAnalyzer: Send + Sync {
    fn extract_text(
        &self,
        image: ImageInput<'_>,
    ) -> impl Future<Output = Result<TextExtraction, ServiceError>> + Send;

    fn describe_image(
        &self,
        image: ImageInput<'_>,
    ) -> impl Future<Output = Result<ImageDescription, ServiceError>> + Send;
}
