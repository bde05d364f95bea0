use crate::config::AiSettings;
use crate::llm::error::TransportError;
use crate::llm::{GenerationOptions, Transport};
use anyhow::Context;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama `/api/generate` client. Non-streaming; one POST per prompt.
#[derive(Debug, Clone)]
pub struct OllamaTransport {
    http: reqwest::Client,
    url: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaTransport {
    pub fn from_settings(settings: &AiSettings) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !settings.ollama_model.trim().is_empty(),
            "ai.ollama_model is required"
        );
        anyhow::ensure!(
            !settings.ollama_base_url.trim().is_empty(),
            "ai.ollama_base_url is required"
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            url: generate_url(&settings.ollama_base_url, &settings.generate_path),
            model: settings.ollama_model.trim().to_string(),
            options: settings.generation_options(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        let options = (!self.options.is_empty()).then(|| ModelOptions {
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            num_predict: self.options.max_tokens,
            stop: (!self.options.stop.is_empty()).then_some(self.options.stop.as_slice()),
        });

        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        }
    }
}

fn generate_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim().trim_end_matches('/'),
        path.trim().trim_start_matches('/')
    )
}

#[async_trait::async_trait]
impl Transport for OllamaTransport {
    async fn send_prompt(&self, prompt: &str) -> Result<Vec<u8>, TransportError> {
        let started = std::time::Instant::now();
        let res = self
            .http
            .post(&self.url)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = res.status();
        let body = res.bytes().await?;

        tracing::debug!(
            model = %self.model,
            %status,
            body_len = body.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "ollama generate completed"
        );

        if status != StatusCode::OK {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body.to_vec())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions<'a>>,
}

#[derive(Debug, Serialize)]
struct ModelOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

/// Response envelope of a non-streaming `/api/generate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateEnvelope {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    pub response: String,
    #[serde(default)]
    pub done: bool,
}
