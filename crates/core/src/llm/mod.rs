use crate::llm::error::TransportError;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod extractor;
pub mod json;
pub mod ollama;
pub mod prompt;

/// Optional sampling parameters forwarded to the text-generation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl GenerationOptions {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.max_tokens.is_none()
            && self.stop.is_empty()
    }
}

/// Sends one rendered prompt and returns the raw response body.
///
/// Implementations must be stateless between calls; the extractor may be
/// shared across tasks.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send_prompt(&self, prompt: &str) -> Result<Vec<u8>, TransportError>;
}
