use crate::llm::extractor::BatchMessage;
use anyhow::Context;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: Uuid,
    pub telegram_id: Option<i64>,
    pub channel: String,
    pub text: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub sender_username: Option<String>,
}

impl StoredMessage {
    /// `None` for messages without text (media-only posts).
    pub fn into_batch_message(self) -> Option<BatchMessage<Uuid>> {
        let text = self.text.filter(|t| !t.trim().is_empty())?;
        let channel = Some(self.channel).filter(|c| !c.trim().is_empty());
        Some(BatchMessage {
            message_id: self.id,
            text,
            channel,
        })
    }
}

/// Oldest messages that have no stored predictions yet.
pub async fn fetch_without_predictions(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<StoredMessage>> {
    anyhow::ensure!(limit >= 1, "limit must be >= 1 (got {limit})");

    sqlx::query_as::<_, StoredMessage>(
        "SELECT m.id, m.telegram_id, m.channel, m.text, m.sent_at, m.sender_username \
         FROM messages m \
         LEFT JOIN predictions p ON m.id = p.message_id \
         WHERE p.id IS NULL \
         ORDER BY m.sent_at ASC \
         LIMIT $1",
    )
    .persistent(false)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select messages without predictions failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(text: Option<&str>, channel: &str) -> StoredMessage {
        StoredMessage {
            id: Uuid::nil(),
            telegram_id: Some(101),
            channel: channel.to_string(),
            text: text.map(str::to_string),
            sent_at: Utc::now(),
            sender_username: None,
        }
    }

    #[test]
    fn text_messages_become_batch_inputs() {
        let msg = stored(Some("SBER цель 320"), "Пульс").into_batch_message().unwrap();
        assert_eq!(msg.message_id, Uuid::nil());
        assert_eq!(msg.text, "SBER цель 320");
        assert_eq!(msg.channel.as_deref(), Some("Пульс"));

        let msg = stored(Some("text"), " ").into_batch_message().unwrap();
        assert!(msg.channel.is_none());
    }

    #[test]
    fn empty_messages_are_skipped() {
        assert!(stored(None, "Пульс").into_batch_message().is_none());
        assert!(stored(Some("   "), "Пульс").into_batch_message().is_none());
    }
}
