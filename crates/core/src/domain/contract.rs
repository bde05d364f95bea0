use crate::domain::prediction::PredictionRecord;
use crate::domain::scalar::FlexibleScalar;
use serde::{Deserialize, Deserializer};

/// Prediction object as the model emits it. Missing keys and JSON nulls in
/// text fields become empty strings; `message_id` is accepted in any shape
/// and never trusted.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmPrediction {
    #[serde(default)]
    pub message_id: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub prediction_type: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub ticker: String,
    #[serde(default)]
    pub target_price: FlexibleScalar,
    #[serde(default)]
    pub target_change_percent: FlexibleScalar,
    #[serde(default, deserialize_with = "string_or_null")]
    pub period: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub recommendation: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub direction: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub justification_text: String,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl LlmPrediction {
    /// Stamps the caller's correlation identifier, replacing whatever the
    /// model echoed back.
    pub fn into_record<I>(self, message_id: I) -> PredictionRecord<I> {
        PredictionRecord {
            message_id,
            prediction_type: self.prediction_type.trim().to_string(),
            ticker: self.ticker.trim().to_string(),
            target_price: self.target_price,
            target_change_percent: self.target_change_percent,
            period: self.period.trim().to_string(),
            recommendation: self.recommendation.trim().to_string(),
            direction: self.direction.trim().to_string(),
            justification_text: self.justification_text.trim().to_string(),
        }
    }
}
