use crate::backup::artifacts::{
    CHANNELS_KEY, USERS_KEY, channel_key, notification_text, render_directory, render_transcript,
};
use crate::error::Result;
use crate::history::{HistoryFetcher, RateLimiter, RetryPolicy, retry};
use crate::logging::{Timer, log_error};
use crate::run::{RunId, generate_run_id};
use crate::slack::DirectoryService;
use crate::storage::ObjectSink;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::Instrument;

/// Pause between channels when no pacer is configured.
pub const DEFAULT_CHANNEL_DELAY: Duration = Duration::from_secs(5);

/// Progress of one run. Any failure moves straight to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    UsersSaved,
    ChannelsSaved,
    FetchingChannel { index: usize, name: String },
    ChannelSaved { index: usize, name: String },
    Notified,
    Done,
    Failed,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub users: usize,
    pub channels: usize,
    pub messages: usize,
    pub pages: usize,
    pub artifacts: usize,
    pub bytes_written: usize,
    pub notified: bool,
}

/// Runs a full backup: users, channels, then each channel's history, then
/// the completion notice. Strictly sequential; the first error aborts the run.
pub struct BackupOrchestrator<'a, D, S> {
    service: &'a D,
    fetcher: HistoryFetcher<'a, D>,
    sink: &'a S,
    pacer: RateLimiter,
    retry: RetryPolicy,
    notification_channel: Option<String>,
    run_id: RunId,
    state: RunState,
}

impl<'a, D: DirectoryService, S: ObjectSink> BackupOrchestrator<'a, D, S> {
    pub fn new(service: &'a D, fetcher: HistoryFetcher<'a, D>, sink: &'a S) -> Self {
        Self {
            service,
            fetcher,
            sink,
            pacer: RateLimiter::with_interval(DEFAULT_CHANNEL_DELAY),
            retry: RetryPolicy::none(),
            notification_channel: None,
            run_id: generate_run_id(),
            state: RunState::Idle,
        }
    }

    /// Limiter consulted before each channel's history fetch
    pub fn with_channel_pacer(mut self, pacer: RateLimiter) -> Self {
        self.pacer = pacer;
        self
    }

    /// Retry policy for listings, uploads and the notification
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_notification(mut self, target: Option<String>) -> Self {
        self.notification_channel = target;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let span = tracing::info_span!("backup", run_id = %self.run_id);
        let _timer = Timer::new("backup_run");

        let result = self.execute().instrument(span).await;
        if let Err(e) = &result {
            log_error("backup_run", e);
            self.transition(RunState::Failed);
        }
        result
    }

    async fn execute(&mut self) -> Result<RunSummary> {
        let service = self.service;
        let started_at = Utc::now();
        let mut bytes_written = 0;
        let mut artifacts = 0;

        tracing::info!(destination = %self.sink.location(), "Starting backup");

        tracing::info!("Saving user directory to {}", USERS_KEY);
        // Listings retry per page inside the service, keeping pages already received
        let users = service.list_users().await?;
        let body = render_directory(&users.records)?;
        bytes_written += self.deliver(USERS_KEY, body).await?;
        artifacts += 1;
        self.transition(RunState::UsersSaved);

        let directory = service.list_channels().await?;
        // Resolve every key before writing anything channel-related
        let channels = directory.channels()?;
        let keys = channels
            .iter()
            .map(|c| channel_key(&c.name))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Saving channel directory to {}", CHANNELS_KEY);
        let body = render_directory(&directory.records)?;
        bytes_written += self.deliver(CHANNELS_KEY, body).await?;
        artifacts += 1;
        self.transition(RunState::ChannelsSaved);

        let total = channels.len();
        let mut messages = 0;
        let mut pages = 0;

        for (index, (channel, key)) in channels.iter().zip(&keys).enumerate() {
            self.pacer.acquire().await;
            self.transition(RunState::FetchingChannel {
                index,
                name: channel.name.clone(),
            });

            let timer = Timer::new(format!("channel {}", channel.name));
            let transcript = self.fetcher.fetch(&channel.id).await?;
            let body = render_transcript(&transcript.messages)?;
            bytes_written += self.deliver(key, body).await?;
            artifacts += 1;
            messages += transcript.len();
            pages += transcript.pages;

            tracing::info!(
                channel = %channel.name,
                channel_id = %channel.id.as_str(),
                progress = %format!("{}/{}", index + 1, total),
                messages = transcript.len(),
                pages = transcript.pages,
                duration_ms = timer.elapsed_ms(),
                "Channel backed up"
            );
            self.transition(RunState::ChannelSaved {
                index,
                name: channel.name.clone(),
            });
        }

        let notified = match self.notification_channel.clone() {
            Some(target) => {
                let text = notification_text(&self.sink.location());
                retry(&self.retry, "chat.postMessage", || {
                    service.post_notification(&target, &text)
                })
                .await?;
                tracing::info!(channel = %target, "Completion notification sent");
                self.transition(RunState::Notified);
                true
            }
            None => {
                tracing::info!("No notification channel configured, skipping completion notice");
                false
            }
        };

        self.transition(RunState::Done);

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            users: users.len(),
            channels: total,
            messages,
            pages,
            artifacts,
            bytes_written,
            notified,
        };

        tracing::info!(
            users = summary.users,
            channels = summary.channels,
            messages = summary.messages,
            artifacts = summary.artifacts,
            bytes = summary.bytes_written,
            "Backup complete"
        );

        Ok(summary)
    }

    /// Put one artifact, returning its size
    async fn deliver(&self, key: &str, body: String) -> Result<usize> {
        let bytes = body.len();
        retry(&self.retry, "sink.put", || self.sink.put(key, body.clone())).await?;
        tracing::debug!(key = %key, bytes, "Artifact delivered");
        Ok(bytes)
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = ?self.state, to = ?next, "Backup state changed");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiverError;
    use crate::storage::MemorySink;
    use crate::testing::{FakeWorkspace, message_history};
    use serde_json::{Value, json};

    fn orchestrator<'a>(
        workspace: &'a FakeWorkspace,
        sink: &'a MemorySink,
    ) -> BackupOrchestrator<'a, FakeWorkspace, MemorySink> {
        BackupOrchestrator::new(workspace, HistoryFetcher::new(workspace), sink)
            .with_channel_pacer(RateLimiter::unlimited())
            .with_notification(Some("#backups".to_string()))
    }

    fn five_channels() -> FakeWorkspace {
        (1..=5).fold(FakeWorkspace::new(), |workspace, i| {
            workspace.with_channel(&format!("C{}", i), &format!("channel-{}", i), message_history(3))
        })
    }

    #[tokio::test]
    async fn test_directories_are_saved_verbatim_and_sorted() {
        let workspace = FakeWorkspace::new()
            .with_users(vec![json!({"name": "Cormac"}), json!({"name": "el"})])
            .with_channel_record(json!({"name": "random", "is_channel": true, "id": "C0G9QF9GW"}))
            .with_history("C0G9QF9GW", vec![]);
        let sink = MemorySink::new();

        orchestrator(&workspace, &sink).run().await.unwrap();

        assert_eq!(
            sink.get(USERS_KEY).unwrap(),
            "[\n  {\n    \"name\": \"Cormac\"\n  },\n  {\n    \"name\": \"el\"\n  }\n]"
        );
        assert_eq!(
            sink.get(CHANNELS_KEY).unwrap(),
            "[\n  {\n    \"id\": \"C0G9QF9GW\",\n    \"is_channel\": true,\n    \"name\": \"random\"\n  }\n]"
        );
    }

    #[tokio::test]
    async fn test_user_records_pass_through() {
        let users: Vec<Value> = (0..7)
            .map(|i| json!({"id": format!("U{}", i), "name": format!("user{}", i), "deleted": false}))
            .collect();
        let workspace = FakeWorkspace::new().with_users(users.clone());
        let sink = MemorySink::new();

        orchestrator(&workspace, &sink).run().await.unwrap();

        let saved: Vec<Value> = serde_json::from_str(&sink.get(USERS_KEY).unwrap()).unwrap();
        assert_eq!(saved, users);
        assert_eq!(sink.get(CHANNELS_KEY).as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_channel_artifact_key() {
        let workspace = FakeWorkspace::new().with_channel("C1", "general", message_history(2));
        let sink = MemorySink::new();

        let summary = orchestrator(&workspace, &sink).run().await.unwrap();

        assert_eq!(
            sink.keys(),
            vec!["channels.json", "general/general.json", "users.json"]
        );
        assert_eq!(summary.artifacts, 3);
        assert_eq!(summary.messages, 2);
    }

    #[tokio::test]
    async fn test_transcript_is_complete_and_ordered() {
        let history = message_history(2345);
        let workspace = FakeWorkspace::new().with_channel("C1", "general", history.clone());
        let sink = MemorySink::new();

        orchestrator(&workspace, &sink).run().await.unwrap();

        let saved: Vec<Value> =
            serde_json::from_str(&sink.get("general/general.json").unwrap()).unwrap();
        assert_eq!(saved, history);

        let body = sink.get("general/general.json").unwrap();
        assert!(body.find("\"type\"").unwrap() < body.find("\"ts\"").unwrap());
    }

    #[tokio::test]
    async fn test_failure_aborts_run_without_notification() {
        let workspace = five_channels();
        workspace.fail_page("C3", ArchiverError::Transport("connection reset".into()));
        let sink = MemorySink::new();
        let mut backup = orchestrator(&workspace, &sink);

        let err = backup.run().await.unwrap_err();

        assert!(matches!(err, ArchiverError::Transport(_)));
        assert_eq!(backup.state(), &RunState::Failed);
        assert!(sink.contains("channel-1/channel-1.json"));
        assert!(sink.contains("channel-2/channel-2.json"));
        for i in 3..=5 {
            assert!(!sink.contains(&format!("channel-{}/channel-{}.json", i, i)));
        }
        assert!(workspace.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_policy_survives_flaky_page() {
        let workspace = five_channels();
        workspace.fail_page("C3", ArchiverError::RateLimited { retry_after: None });
        let sink = MemorySink::new();
        let fetcher = HistoryFetcher::new(&workspace).with_retry(RetryPolicy::default());
        let mut backup = BackupOrchestrator::new(&workspace, fetcher, &sink)
            .with_channel_pacer(RateLimiter::unlimited());

        let summary = backup.run().await.unwrap();

        assert_eq!(summary.channels, 5);
        assert_eq!(summary.messages, 15);
        assert_eq!(backup.state(), &RunState::Done);
    }

    #[tokio::test]
    async fn test_rerun_is_byte_identical() {
        let workspace = five_channels()
            .with_users(vec![json!({"name": "el", "id": "U2"}), json!({"id": "U1", "name": "Cormac"})]);
        let first = MemorySink::new();
        let second = MemorySink::new();

        orchestrator(&workspace, &first).run().await.unwrap();
        orchestrator(&workspace, &second).run().await.unwrap();

        assert_eq!(first.keys(), second.keys());
        for key in first.keys() {
            assert_eq!(first.get(&key), second.get(&key), "{}", key);
        }
    }

    #[tokio::test]
    async fn test_notification_names_destination() {
        let workspace = five_channels();
        let sink = MemorySink::new();
        let mut backup = orchestrator(&workspace, &sink);

        let summary = backup.run().await.unwrap();

        assert!(summary.notified);
        assert_eq!(backup.state(), &RunState::Done);
        assert_eq!(
            workspace.notifications(),
            vec![(
                "#backups".to_string(),
                "All public channels have been backed up to memory (dry run)".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_no_notification_target() {
        let workspace = five_channels();
        let sink = MemorySink::new();
        let mut backup = orchestrator(&workspace, &sink).with_notification(None);

        let summary = backup.run().await.unwrap();

        assert!(!summary.notified);
        assert!(workspace.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_authentication_failure_writes_nothing() {
        let workspace = five_channels();
        workspace.fail_listing(ArchiverError::Authentication("invalid_auth".into()));
        let sink = MemorySink::new();
        let mut backup = orchestrator(&workspace, &sink).with_retry(RetryPolicy::default());

        let err = backup.run().await.unwrap_err();

        assert!(matches!(err, ArchiverError::Authentication(_)));
        assert_eq!(workspace.user_calls(), 1);
        assert_eq!(sink.put_count(), 0);
        assert_eq!(backup.state(), &RunState::Failed);
    }

    #[tokio::test]
    async fn test_listing_failure_is_not_restarted_from_scratch() {
        let workspace = FakeWorkspace::new().with_channel("C1", "general", message_history(1));
        workspace.fail_listing(ArchiverError::RateLimited { retry_after: None });
        let sink = MemorySink::new();
        let mut backup = orchestrator(&workspace, &sink).with_retry(RetryPolicy::default());

        let err = backup.run().await.unwrap_err();

        assert!(matches!(err, ArchiverError::RateLimited { .. }));
        assert_eq!(workspace.user_calls(), 1);
        assert_eq!(sink.put_count(), 0);
    }

    #[tokio::test]
    async fn test_unusable_channel_name_aborts_before_channel_directory() {
        let workspace = FakeWorkspace::new().with_channel("C1", "bad/name", message_history(1));
        let sink = MemorySink::new();

        let err = orchestrator(&workspace, &sink).run().await.unwrap_err();

        assert!(matches!(err, ArchiverError::MalformedResponse { .. }));
        assert!(sink.contains(USERS_KEY));
        assert!(!sink.contains(CHANNELS_KEY));
        assert!(workspace.page_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_are_paced() {
        let workspace = FakeWorkspace::new()
            .with_channel("C1", "one", message_history(1))
            .with_channel("C2", "two", message_history(1))
            .with_channel("C3", "three", message_history(1));
        let sink = MemorySink::new();
        let mut backup = BackupOrchestrator::new(&workspace, HistoryFetcher::new(&workspace), &sink);

        let start = tokio::time::Instant::now();
        backup.run().await.unwrap();

        assert!(start.elapsed() >= DEFAULT_CHANNEL_DELAY * 2);
    }

    struct FailingSink {
        inner: MemorySink,
        failing_key: &'static str,
    }

    impl ObjectSink for FailingSink {
        async fn put(&self, key: &str, body: String) -> Result<()> {
            if key == self.failing_key {
                return Err(ArchiverError::storage(key, "access denied"));
            }
            self.inner.put(key, body).await
        }

        fn location(&self) -> String {
            "failing".to_string()
        }
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_run() {
        let workspace = five_channels();
        let sink = FailingSink {
            inner: MemorySink::new(),
            failing_key: "channel-2/channel-2.json",
        };
        let mut backup = BackupOrchestrator::new(&workspace, HistoryFetcher::new(&workspace), &sink)
            .with_channel_pacer(RateLimiter::unlimited())
            .with_notification(Some("#backups".to_string()));

        let err = backup.run().await.unwrap_err();

        assert!(matches!(err, ArchiverError::Storage { .. }));
        assert!(sink.inner.contains("channel-1/channel-1.json"));
        assert!(!sink.inner.contains("channel-3/channel-3.json"));
        assert!(workspace.notifications().is_empty());
    }
}
