use crate::domain::prediction::AnalysisResult;
use crate::llm::error::{ExtractionError, TransportError};
use crate::llm::ollama::GenerateEnvelope;
use crate::llm::{json, prompt, Transport};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// One input of a batch run.
#[derive(Debug, Clone)]
pub struct BatchMessage<I> {
    pub message_id: I,
    pub text: String,
    /// Overrides the batch-wide channel label for this message.
    pub channel: Option<String>,
}

impl<I> BatchMessage<I> {
    pub fn new(message_id: I, text: impl Into<String>) -> Self {
        Self {
            message_id,
            text: text.into(),
            channel: None,
        }
    }
}

#[derive(Debug)]
pub struct BatchFailure<I> {
    pub message_id: I,
    pub error: ExtractionError,
}

#[derive(Debug)]
pub struct BatchReport<I> {
    pub results: Vec<AnalysisResult<I>>,
    pub failures: Vec<BatchFailure<I>>,
    /// Messages never attempted because the run was cancelled.
    pub skipped: usize,
    pub cancelled: bool,
}

impl<I> BatchReport<I> {
    fn new() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
            skipped: 0,
            cancelled: false,
        }
    }

    pub fn prediction_count(&self) -> usize {
        self.results.iter().map(|r| r.predictions().len()).sum()
    }
}

/// Prompt → transport → payload location → decoding → filtering, one
/// message at a time.
#[derive(Debug, Clone)]
pub struct Extractor<T> {
    transport: T,
}

impl<T: Transport> Extractor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn analyze_message<I>(
        &self,
        cancel: &CancellationToken,
        text: &str,
        channel: &str,
        message_id: I,
    ) -> Result<AnalysisResult<I>, ExtractionError>
    where
        I: Clone + fmt::Display,
    {
        let prompt = prompt::build_prompt(text, channel, &message_id);

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            res = self.transport.send_prompt(&prompt) => res?,
        };

        let envelope: GenerateEnvelope =
            serde_json::from_slice(&body).map_err(|source| ExtractionError::EnvelopeDecode {
                source,
                body: String::from_utf8_lossy(&body).into_owned(),
            })?;

        if !envelope.done {
            tracing::warn!(%message_id, model = %envelope.model, "LLM reported an unfinished generation");
        }

        let decoded = json::parse_reply(&envelope.response, message_id.clone())?;
        let decoded_count = decoded.predictions().len();

        let result = decoded
            .retain(|r| !r.is_degenerate())
            .ok_or_else(|| ExtractionError::NoPredictions {
                content: envelope.response.clone(),
            })?;

        tracing::info!(
            %message_id,
            records = result.predictions().len(),
            dropped = decoded_count - result.predictions().len(),
            "message analysed"
        );

        Ok(result)
    }

    pub async fn analyze_batch<I>(
        &self,
        cancel: &CancellationToken,
        messages: Vec<BatchMessage<I>>,
        channel: &str,
    ) -> BatchReport<I>
    where
        I: Clone + fmt::Display,
    {
        self.analyze_batch_with(cancel, messages, channel, |_, _| {})
            .await
    }

    /// Sequential batch. A failed message is logged and recorded, and the run
    /// moves on; cancellation stops the run and keeps what was computed.
    /// `on_result` sees each successful result as soon as it is available.
    pub async fn analyze_batch_with<I, F>(
        &self,
        cancel: &CancellationToken,
        messages: Vec<BatchMessage<I>>,
        channel: &str,
        mut on_result: F,
    ) -> BatchReport<I>
    where
        I: Clone + fmt::Display,
        F: FnMut(usize, &AnalysisResult<I>),
    {
        let total = messages.len();
        let mut report = BatchReport::new();
        let mut pending = messages.into_iter();

        for (idx, message) in pending.by_ref().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.skipped += 1;
                break;
            }

            tracing::info!(
                message_id = %message.message_id,
                position = idx + 1,
                total,
                "analysing message"
            );

            let channel = message.channel.as_deref().unwrap_or(channel);
            match self
                .analyze_message(cancel, &message.text, channel, message.message_id.clone())
                .await
            {
                Ok(result) => {
                    on_result(idx, &result);
                    report.results.push(result);
                }
                Err(error) => {
                    let cancelled = error.is_cancelled();
                    tracing::warn!(
                        message_id = %message.message_id,
                        stage = error.stage(),
                        error = %error,
                        "failed to analyse message"
                    );
                    report.failures.push(BatchFailure {
                        message_id: message.message_id,
                        error,
                    });
                    if cancelled {
                        report.cancelled = true;
                        break;
                    }
                }
            }
        }

        report.skipped += pending.count();
        tracing::info!(
            total,
            succeeded = report.results.len(),
            failed = report.failures.len(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            predictions = report.prediction_count(),
            "batch finished"
        );
        report
    }
}
