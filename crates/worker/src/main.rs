use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tradar_core::llm::extractor::{BatchMessage, BatchReport, Extractor};
use tradar_core::llm::ollama::OllamaTransport;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod input;
mod output;

use output::{OutputTo, Sink};

#[derive(Debug, Parser)]
#[command(name = "tradar_worker")]
struct Args {
    /// Settings file (YAML/TOML) with an `ai` section.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Text file with one message per line.
    #[arg(long, conflicts_with = "from_db", required_unless_present = "from_db")]
    input_file: Option<PathBuf>,

    /// Analyse stored messages that have no predictions yet and persist the results.
    #[arg(long)]
    from_db: bool,

    /// Maximum number of stored messages to analyse in one run.
    #[arg(long, default_value_t = 50)]
    limit: i64,

    /// Channel label passed to the model when a message carries none.
    #[arg(long, default_value = "TestChannel")]
    channel: String,

    #[arg(long, value_enum, default_value_t = OutputTo::Console)]
    output_to: OutputTo,

    #[arg(long, default_value = "analysis_results.json")]
    output_file: PathBuf,

    /// Debug logging, including located model payloads.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let settings = tradar_core::config::Settings::load(args.config.as_deref())?;
    let _sentry_guard = init_sentry(&settings);

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let transport = OllamaTransport::from_settings(&settings.ai)?;
    tracing::info!(model = transport.model(), url = transport.url(), "using Ollama endpoint");
    let extractor = Extractor::new(transport);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; finishing with partial results");
            shutdown.cancel();
        }
    });

    if args.from_db {
        run_from_db(&settings, &extractor, &cancel, &args).await
    } else {
        let path = args
            .input_file
            .as_deref()
            .context("--input-file or --from-db is required")?;
        let messages = input::read_messages(path)?;
        tracing::info!(count = messages.len(), path = %path.display(), "read messages");
        run_batch(&extractor, &cancel, messages, &args).await?;
        Ok(())
    }
}

async fn run_batch(
    extractor: &Extractor<OllamaTransport>,
    cancel: &CancellationToken,
    messages: Vec<BatchMessage<Uuid>>,
    args: &Args,
) -> anyhow::Result<BatchReport<Uuid>> {
    let mut sink = Sink::new(args.output_to, args.output_file.clone());
    let mut sink_error: Option<anyhow::Error> = None;

    let report = extractor
        .analyze_batch_with(cancel, messages, &args.channel, |idx, result| {
            if let Err(err) = sink.accept(idx, result) {
                tracing::error!(error = %err, "failed to emit analysis result");
                sink_error.get_or_insert(err);
            }
        })
        .await;

    for failure in &report.failures {
        if !failure.error.is_cancelled() {
            sentry::capture_error(&failure.error);
        }
    }

    tracing::info!(
        succeeded = report.results.len(),
        failed = report.failures.len(),
        skipped = report.skipped,
        cancelled = report.cancelled,
        "processing completed"
    );

    match sink_error {
        Some(err) => Err(err),
        None => Ok(report),
    }
}

async fn run_from_db(
    settings: &tradar_core::config::Settings,
    extractor: &Extractor<OllamaTransport>,
    cancel: &CancellationToken,
    args: &Args,
) -> anyhow::Result<()> {
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    tradar_core::storage::migrate(&pool).await?;

    let acquired = tradar_core::storage::lock::try_acquire_backlog_lock(&pool).await?;
    if !acquired {
        tracing::warn!("backlog lock not acquired; another run in progress");
        return Ok(());
    }

    let outcome = analyse_backlog(&pool, extractor, cancel, args).await;

    release_backlog_lock(&pool).await;
    outcome
}

/// Returns whether the lock was released; failures are logged, not raised.
async fn release_backlog_lock(pool: &sqlx::PgPool) -> bool {
    match tradar_core::storage::lock::release_backlog_lock(pool).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "backlog lock release failed; it is held until the session ends");
            false
        }
    }
}

async fn analyse_backlog(
    pool: &sqlx::PgPool,
    extractor: &Extractor<OllamaTransport>,
    cancel: &CancellationToken,
    args: &Args,
) -> anyhow::Result<()> {
    let stored = tradar_core::storage::messages::fetch_without_predictions(pool, args.limit).await?;
    let fetched = stored.len();
    let messages: Vec<_> = stored
        .into_iter()
        .filter_map(|m| m.into_batch_message())
        .collect();
    tracing::info!(fetched, with_text = messages.len(), "loaded unanalysed messages");

    if messages.is_empty() {
        return Ok(());
    }

    let report = run_batch(extractor, cancel, messages, args).await?;

    let mut persisted = 0usize;
    for result in &report.results {
        match tradar_core::storage::predictions::persist_analysis(pool, result).await {
            Ok(ids) => persisted += ids.len(),
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(message_id = %result.message_id(), error = %err, "failed to persist predictions");
            }
        }
    }

    tracing::info!(persisted, "persisted predictions");
    Ok(())
}

fn init_sentry(settings: &tradar_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn lock_release_failure_is_reported_not_raised() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy("postgres://tradar@127.0.0.1:1/tradar")
            .unwrap();

        assert!(!release_backlog_lock(&pool).await);
    }
}
