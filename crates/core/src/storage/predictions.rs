use crate::domain::prediction::{AnalysisResult, PredictionRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PredictionRow {
    pub id: Uuid,
    pub message_id: Uuid,
    pub ticker: String,
    pub prediction_type: Option<String>,
    pub target_price: Option<String>,
    pub target_change_percent: Option<String>,
    pub period: Option<String>,
    pub recommendation: Option<String>,
    pub direction: Option<String>,
    pub justification_text: Option<String>,
    pub predicted_at: DateTime<Utc>,
}

/// Inserts every record of one analysed message in a single transaction.
pub async fn persist_analysis(
    pool: &sqlx::PgPool,
    analysis: &AnalysisResult<Uuid>,
) -> anyhow::Result<Vec<Uuid>> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let predicted_at = Utc::now();
    let mut ids = Vec::with_capacity(analysis.predictions().len());
    for record in analysis.predictions() {
        ids.push(insert_record(&mut tx, record, predicted_at).await?);
    }

    tx.commit().await.context("commit transaction failed")?;

    tracing::debug!(
        message_id = %analysis.message_id(),
        inserted = ids.len(),
        "persisted predictions"
    );
    Ok(ids)
}

async fn insert_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &PredictionRecord<Uuid>,
    predicted_at: DateTime<Utc>,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO predictions (id, message_id, ticker, prediction_type, target_price, \
         target_change_percent, period, recommendation, direction, justification_text, predicted_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .persistent(false)
    .bind(id)
    .bind(record.message_id)
    .bind(&record.ticker)
    .bind(non_empty(&record.prediction_type))
    .bind(record.target_price.to_column())
    .bind(record.target_change_percent.to_column())
    .bind(non_empty(&record.period))
    .bind(non_empty(&record.recommendation))
    .bind(non_empty(&record.direction))
    .bind(non_empty(&record.justification_text))
    .bind(predicted_at)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("insert predictions failed (message_id={})", record.message_id))?;

    Ok(id)
}

pub async fn fetch_for_message(
    pool: &sqlx::PgPool,
    message_id: Uuid,
) -> anyhow::Result<Vec<PredictionRow>> {
    sqlx::query_as::<_, PredictionRow>(
        "SELECT id, message_id, ticker, prediction_type, target_price, target_change_percent, \
         period, recommendation, direction, justification_text, predicted_at \
         FROM predictions \
         WHERE message_id = $1 \
         ORDER BY predicted_at ASC, id ASC",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select predictions failed (message_id={message_id})"))
}

// Empty strings are the decoder's "absent" sentinel; store them as NULL.
fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}
