use crate::error::{ArchiverError, Result};
use crate::history::PAGE_SIZE;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub slack: SlackConfig,
    pub destination: DestinationConfig,
    pub export: ExportConfig,
    pub retry: RetryConfig,
    /// `LOG_FORMAT=json`
    pub json_logs: bool,
}

#[derive(Clone)]
pub struct SlackConfig {
    pub token: String,
    pub channel_types: Vec<String>,
    pub notification_channel: Option<String>,
    pub notification_username: String,
    pub http_timeout: Duration,
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("token", &"<redacted>")
            .field("channel_types", &self.channel_types)
            .field("notification_channel", &self.notification_channel)
            .field("notification_username", &self.notification_username)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

#[derive(Clone)]
pub enum DestinationConfig {
    S3 {
        bucket: String,
        prefix: String,
        region: String,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    },
    Filesystem {
        root: PathBuf,
    },
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 {
                bucket,
                prefix,
                region,
                access_key_id,
                ..
            } => f
                .debug_struct("S3")
                .field("bucket", bucket)
                .field("prefix", prefix)
                .field("region", region)
                .field("explicit_credentials", &access_key_id.is_some())
                .finish(),
            Self::Filesystem { root } => f.debug_struct("Filesystem").field("root", root).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub page_size: usize,
    pub channel_delay: Duration,
    /// Zero disables page pacing
    pub history_requests_per_minute: u32,
    /// `users.list` / `conversations.list` pages; zero disables pacing
    pub listing_requests_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Load settings from the process environment, after reading `.env` (or `env_file`).
pub fn load_settings(env_file: Option<&Path>) -> Result<Settings> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                ArchiverError::Config(format!("Cannot read env file {}: {}", path.display(), e))
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    Settings::from_lookup(|key| std::env::var(key).ok())
}

impl Settings {
    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let slack = SlackConfig {
            token: var("SLACK_TOKEN")
                .ok_or_else(|| ArchiverError::Config("SLACK_TOKEN not set".to_string()))?,
            channel_types: var("CHANNEL_TYPES")
                .unwrap_or_else(|| "public_channel".to_string())
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            notification_channel: var("NOTIFICATION_CHANNEL"),
            notification_username: var("NOTIFICATION_USERNAME")
                .unwrap_or_else(|| "Slack Archiver".to_string()),
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 30u64)?),
        };

        if slack.channel_types.is_empty() {
            return Err(ArchiverError::Config(
                "CHANNEL_TYPES must name at least one type".to_string(),
            ));
        }

        let destination = match var("BUCKET_NAME") {
            Some(bucket) => DestinationConfig::S3 {
                bucket,
                prefix: var("S3_PREFIX")
                    .map(|p| p.trim_matches('/').to_string())
                    .unwrap_or_default(),
                region: var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                access_key_id: var("AWS_ACCESS_KEY_ID"),
                secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            },
            None => DestinationConfig::Filesystem {
                root: var("OUTPUT_DIR")
                    .unwrap_or_else(|| "./backup".to_string())
                    .into(),
            },
        };

        let page_size = parse_or(&var, "PAGE_SIZE", PAGE_SIZE)?;
        if page_size == 0 || page_size > PAGE_SIZE {
            return Err(ArchiverError::Config(format!(
                "PAGE_SIZE must be between 1 and {}",
                PAGE_SIZE
            )));
        }

        let export = ExportConfig {
            page_size,
            channel_delay: Duration::from_millis(parse_or(&var, "CHANNEL_DELAY_MS", 5000u64)?),
            history_requests_per_minute: parse_or(&var, "HISTORY_REQUESTS_PER_MINUTE", 50u32)?,
            listing_requests_per_minute: parse_or(&var, "LISTING_REQUESTS_PER_MINUTE", 20u32)?,
        };

        let retry = RetryConfig {
            max_retries: parse_or(&var, "MAX_RETRIES", 3u32)?,
            base_delay: Duration::from_millis(parse_or(&var, "RETRY_BASE_DELAY_MS", 1000u64)?),
            max_delay: Duration::from_millis(parse_or(&var, "RETRY_MAX_DELAY_MS", 60_000u64)?),
        };

        let json_logs = var("LOG_FORMAT").is_some_and(|f| f.trim().eq_ignore_ascii_case("json"));

        Ok(Self {
            slack,
            destination,
            export,
            retry,
            json_logs,
        })
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ArchiverError::Config(format!("Invalid {}: {:?}", key, raw))),
        None => Ok(default),
    }
}
