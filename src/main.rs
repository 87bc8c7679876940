//! CLI entrypoint: `stream` (default, live processing) and `backfill`
//! (historical replay) run modes, per spec §6.

use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tokio::sync::watch;

use engagement_stream_processor::backfill::BackfillCoordinator;
use engagement_stream_processor::config::Settings;
use engagement_stream_processor::content::{ContentResolver, PostgresContentStore};
use engagement_stream_processor::enrich::Enricher;
use engagement_stream_processor::monitoring::logging::init_structured_logging;
use engagement_stream_processor::sinks::{HttpSink, LeaderboardSink, WarehouseSink};
use engagement_stream_processor::stream::{StdinEventLog, StreamCoordinator};

#[derive(Parser)]
#[command(name = "engagement-stream-processor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the live log and process batches continuously (default).
    Stream,
    /// Replay a bounded historical range through the same three sinks.
    Backfill {
        #[arg(long, value_name = "YYYY-MM-DD")]
        start_date: NaiveDate,
        #[arg(long, value_name = "YYYY-MM-DD")]
        end_date: NaiveDate,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("fatal: invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_structured_logging(&settings.monitoring.log_level);

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Stream);

    let result = match command {
        Command::Stream => run_stream(settings).await,
        Command::Backfill { start_date, end_date } => {
            run_backfill(settings, start_date, end_date).await
        }
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::exit(1);
        }
    }
}

async fn connect_content_pool(settings: &Settings) -> Result<PgPool, String> {
    PgPool::connect(&settings.database.url)
        .await
        .map_err(|e| format!("content store connection failed: {e}"))
}

async fn build_leaderboard(settings: &Settings) -> Result<LeaderboardSink, String> {
    LeaderboardSink::connect(
        &settings.leaderboard.url,
        settings.leaderboard.top_content_key.clone(),
        settings.leaderboard.window_minutes,
        settings.leaderboard.ttl_seconds,
    )
    .await
    .map_err(|e| format!("leaderboard store is mandatory, failed to initialise: {e}"))
}

async fn run_stream(settings: Settings) -> Result<(), String> {
    tracing::info!("starting stream coordinator");

    let content_pool = connect_content_pool(&settings).await?;
    let store = PostgresContentStore::new(content_pool);
    let resolver = ContentResolver::new(store, 10_000, Duration::from_secs(300));
    let enricher = Enricher::new(resolver);

    let mut leaderboard = build_leaderboard(&settings).await?;
    leaderboard.start_cleanup_task();

    let warehouse = WarehouseSink::connect(
        &settings.database.url,
        &settings.warehouse.table,
        settings.warehouse.batch_size,
        settings.warehouse.max_batch_age(),
    )
    .await;

    let http = HttpSink::connect(
        &settings.http_sink.url,
        settings.http_sink.timeout(),
        settings.http_sink.retry_attempts,
    );
    http.start_heartbeat_task();

    let log = StdinEventLog::new();
    let mut coordinator = StreamCoordinator::new(
        log,
        enricher,
        leaderboard,
        warehouse,
        http,
        settings.processing.batch_size,
        settings.processing.interval(),
        settings.log_topic.max_poll_records,
        settings.processing.manual_commit,
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    coordinator.run(&mut shutdown_rx).await;
    tracing::info!(
        processed = coordinator.metrics().processed_count(),
        errors = coordinator.metrics().error_count(),
        "stream coordinator stopped"
    );
    Ok(())
}

async fn run_backfill(
    settings: Settings,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<(), String> {
    let start = Utc
        .from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).unwrap());
    let end = Utc.from_utc_datetime(&end_date.and_hms_opt(0, 0, 0).unwrap());

    tracing::info!(%start, %end, "starting backfill");

    let content_pool = connect_content_pool(&settings).await?;
    let leaderboard = build_leaderboard(&settings).await?;

    let warehouse = WarehouseSink::connect(
        &settings.database.url,
        &settings.warehouse.table,
        settings.warehouse.batch_size,
        settings.warehouse.max_batch_age(),
    )
    .await;

    let http = HttpSink::connect(
        &settings.http_sink.url,
        settings.http_sink.timeout(),
        settings.http_sink.retry_attempts,
    );

    let mut coordinator = BackfillCoordinator::new(
        content_pool,
        leaderboard,
        warehouse,
        http,
        settings.backfill.batch_size as i64,
    );

    let summary = coordinator.run(start, end).await?;
    tracing::info!(
        rows_read = summary.rows_read,
        events_dispatched = summary.events_dispatched,
        rows_skipped = summary.rows_skipped,
        "backfill complete"
    );
    Ok(())
}
