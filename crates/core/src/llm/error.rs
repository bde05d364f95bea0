use std::borrow::Cow;

const EXCERPT_CHARS: usize = 2000;

/// Bounded view of raw model output for error messages and logs.
pub fn excerpt(raw: &str) -> Cow<'_, str> {
    match raw.char_indices().nth(EXCERPT_CHARS) {
        None => Cow::Borrowed(raw),
        Some((cut, _)) => Cow::Owned(format!("{}… ({} bytes total)", &raw[..cut], raw.len())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM endpoint returned non-200 status {status}: {}", excerpt(.body))]
    Status { status: u16, body: String },

    #[error("LLM request cancelled")]
    Cancelled,
}

/// Why a single message produced no predictions. Each variant that saw
/// model output keeps it for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("LLM response envelope is not valid JSON: {source}; body: {}", excerpt(.body))]
    EnvelopeDecode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("no JSON object or array found in LLM output: {}", excerpt(.content))]
    NoJsonFound { content: String },

    #[error("LLM returned empty or null JSON content")]
    EmptyPayload,

    #[error("failed to decode predictions JSON: {source}; content: {}", excerpt(.content))]
    DecodeFailure {
        #[source]
        source: serde_json::Error,
        content: String,
    },

    #[error("LLM analysis returned no predictions from content: {}", excerpt(.content))]
    NoPredictions { content: String },
}

impl ExtractionError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::EnvelopeDecode { .. } => "envelope",
            Self::NoJsonFound { .. } => "locate",
            Self::EmptyPayload => "empty_payload",
            Self::DecodeFailure { .. } => "decode",
            Self::NoPredictions { .. } => "no_predictions",
        }
    }

    /// Raw body or model output that caused the failure, if any was seen.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Transport(TransportError::Status { body, .. }) => Some(body.as_str()),
            Self::EnvelopeDecode { body, .. } => Some(body.as_str()),
            Self::NoJsonFound { content }
            | Self::DecodeFailure { content, .. }
            | Self::NoPredictions { content } => Some(content.as_str()),
            Self::Transport(_) | Self::EmptyPayload => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }
}
