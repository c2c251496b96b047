use anyhow::Context;
use clap::Parser;
use slack_archiver::backup::{BackupOrchestrator, RunSummary};
use slack_archiver::config::{DestinationConfig, Settings, load_settings};
use slack_archiver::history::{HistoryFetcher, RateLimiter, RetryPolicy};
use slack_archiver::logging::init_tracing;
use slack_archiver::slack::SlackClient;
use slack_archiver::storage::{FilesystemSink, MemorySink, ObjectSink, S3Sink};
use slack_archiver::{ArchiverError, ErrorClass};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;

#[derive(Parser)]
#[command(
    name = "slack-archiver",
    version,
    about = "Back up a Slack workspace's users, channels and full message history",
    after_help = "On the free Slack plan only the most recent messages are reachable; \
                  paid plans export the entire history."
)]
struct Cli {
    /// Read configuration from this file instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Write artifacts to this directory, ignoring BUCKET_NAME
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Fetch everything but keep artifacts in memory
    #[arg(long)]
    dry_run: bool,

    /// Skip the completion notification
    #[arg(long)]
    no_notify: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Settings first so LOG_FORMAT from .env applies
    let settings = load_settings(cli.env_file.as_deref());
    init_tracing(cli.json_logs || settings.as_ref().is_ok_and(|s| s.json_logs));

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("🚀 Starting Slack Archiver");
    tracing::debug!(?settings, "Configuration loaded");

    tokio::select! {
        result = run(&cli, &settings) => match result {
            Ok(summary) => {
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{}", json),
                    Err(e) => tracing::warn!(error = %e, "Cannot render run summary"),
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Backup failed");
                exit_code(&e)
            }
        },
        signal_name = shutdown_signal() => {
            tracing::warn!(
                signal = %signal_name,
                "Received shutdown signal, aborting backup; artifacts already written are kept"
            );
            ExitCode::from(130)
        }
    }
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<ArchiverError>().map(ArchiverError::class) {
        Some(ErrorClass::Authentication) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

async fn run(cli: &Cli, settings: &Settings) -> anyhow::Result<RunSummary> {
    let slack = SlackClient::connect(settings.slack.clone())
        .await
        .context("Cannot connect to Slack")?
        .with_retry(RetryPolicy::from(&settings.retry))
        .with_listing_limiter(RateLimiter::per_minute(
            settings.export.listing_requests_per_minute,
        ));

    let notification = if cli.no_notify {
        None
    } else {
        settings.slack.notification_channel.clone()
    };

    if cli.dry_run {
        let sink = MemorySink::new();
        let summary = backup(&slack, &sink, settings, notification).await?;
        tracing::info!(
            artifacts = sink.keys().len(),
            bytes = sink.total_bytes(),
            "Dry run finished, nothing was written"
        );
        return Ok(summary);
    }

    match (&cli.output_dir, &settings.destination) {
        (Some(root), _) | (None, DestinationConfig::Filesystem { root }) => {
            let sink = FilesystemSink::new(root.clone());
            sink.ensure_root()
                .await
                .with_context(|| format!("Cannot create {}", root.display()))?;
            backup(&slack, &sink, settings, notification).await
        }
        (
            None,
            DestinationConfig::S3 {
                bucket,
                prefix,
                region,
                access_key_id,
                secret_access_key,
            },
        ) => {
            let credentials = access_key_id.clone().zip(secret_access_key.clone());
            let sink = S3Sink::connect(bucket.clone(), prefix.clone(), region.clone(), credentials)
                .await;
            backup(&slack, &sink, settings, notification).await
        }
    }
}

async fn backup<S: ObjectSink>(
    slack: &SlackClient,
    sink: &S,
    settings: &Settings,
    notification: Option<String>,
) -> anyhow::Result<RunSummary> {
    let retry = RetryPolicy::from(&settings.retry);

    let fetcher = HistoryFetcher::new(slack)
        .with_page_size(settings.export.page_size)
        .with_limiter(RateLimiter::per_minute(
            settings.export.history_requests_per_minute,
        ))
        .with_retry(retry);

    let mut orchestrator = BackupOrchestrator::new(slack, fetcher, sink)
        .with_channel_pacer(RateLimiter::with_interval(settings.export.channel_delay))
        .with_retry(retry)
        .with_notification(notification);

    tracing::info!(
        run_id = %orchestrator.run_id(),
        destination = %sink.location(),
        "Backup run starting"
    );

    let summary = orchestrator.run().await.context("Backup run failed")?;
    Ok(summary)
}

/// Resolves with the name of the first termination signal received
async fn shutdown_signal() -> String {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Cannot install signal handlers");
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigint.recv() => "SIGINT (Ctrl+C)".to_string(),
            _ = sigterm.recv() => "SIGTERM".to_string(),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
            return std::future::pending().await;
        }
        "Ctrl+C".to_string()
    }
}
