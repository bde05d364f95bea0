use anyhow::Context;
use std::path::Path;
use tradar_core::llm::extractor::BatchMessage;
use uuid::Uuid;

/// One message per line; blank lines are skipped. Each message gets a fresh
/// correlation id since file input has no stored identity.
pub fn read_messages(path: &Path) -> anyhow::Result<Vec<BatchMessage<Uuid>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;

    let messages: Vec<_> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| BatchMessage::new(Uuid::new_v4(), line))
        .collect();

    anyhow::ensure!(
        !messages.is_empty(),
        "input file {} is empty or contains no messages",
        path.display()
    );
    Ok(messages)
}
