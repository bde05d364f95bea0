use anyhow::Context;

// Advisory locks are scoped to the Postgres session. Used as a best-effort guard against two
// workers claiming the same backlog of unanalysed messages.
const BACKLOG_LOCK_KEY: i64 = 0x5452_4144_4152; // "TRADAR" as hex-ish namespace.

pub async fn try_acquire_backlog_lock(pool: &sqlx::PgPool) -> anyhow::Result<bool> {
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(BACKLOG_LOCK_KEY)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={BACKLOG_LOCK_KEY})"))?;
    Ok(acquired.0)
}

pub async fn release_backlog_lock(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(BACKLOG_LOCK_KEY)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={BACKLOG_LOCK_KEY})"))?;
    Ok(())
}
