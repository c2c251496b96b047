use crate::config::SlackConfig;
use crate::error::{ArchiverError, Result};
use crate::history::{RateLimiter, RetryPolicy, retry};
use crate::slack::{
    ChannelDirectory, DirectoryService, Message, Page, PageRequest, UserDirectory,
};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde_json::{Map, Value};
use slack_morphism::errors::SlackClientError;
use slack_morphism::prelude::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const SLACK_API_URL: &str = "https://slack.com/api";

/// Page size for the cursor-paginated listing endpoints.
const LIST_LIMIT: usize = 200;

/// Slack Web API adapter.
///
/// Typed calls (`auth.test`, `chat.postMessage`) go through slack-morphism. Listings
/// and history are fetched as raw JSON so every record is exported verbatim,
/// including fields the typed models do not know about.
pub struct SlackClient {
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
    http: reqwest::Client,
    config: SlackConfig,
    retry: RetryPolicy,
    listing_limiter: RateLimiter,
}

impl SlackClient {
    /// Build the client and verify the token with `auth.test`.
    pub async fn connect(config: SlackConfig) -> Result<Self> {
        let connector = SlackClientHyperConnector::new()
            .map_err(|e| ArchiverError::Transport(e.to_string()))?;

        let client = Arc::new(slack_morphism::SlackClient::new(connector));
        let token = SlackApiToken::new(config.token.clone().into());

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("slack-archiver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ArchiverError::Config(format!("Cannot build HTTP client: {}", e)))?;

        let slack = Self {
            client,
            token,
            http,
            config,
            retry: RetryPolicy::none(),
            listing_limiter: RateLimiter::unlimited(),
        };
        slack.verify_token().await?;

        Ok(slack)
    }

    /// Retry individual listing pages, so a throttled page resumes at its cursor
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pace `users.list` and `conversations.list` page calls
    pub fn with_listing_limiter(mut self, limiter: RateLimiter) -> Self {
        self.listing_limiter = limiter;
        self
    }

    async fn verify_token(&self) -> Result<()> {
        let session = self.client.open_session(&self.token);

        let response = self
            .with_deadline("auth.test", session.auth_test())
            .await?
            .map_err(map_client_error)?;

        tracing::info!(
            team_id = ?response.team_id,
            user_id = ?response.user_id,
            "Slack token verified"
        );
        Ok(())
    }

    async fn with_deadline<T>(&self, method: &str, call: impl Future<Output = T>) -> Result<T> {
        tokio::time::timeout(self.config.http_timeout, call)
            .await
            .map_err(|_| {
                ArchiverError::Transport(format!(
                    "{} timed out after {}s",
                    method,
                    self.config.http_timeout.as_secs()
                ))
            })
    }

    /// Call a Web API method and return its `ok: true` envelope
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<Map<String, Value>> {
        let url = format!("{}/{}", SLACK_API_URL, method);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.token)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            tracing::warn!(method = %method, ?retry_after, "Slack API throttled the request");
            return Err(ArchiverError::RateLimited { retry_after });
        }
        check_status(method, status)?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ArchiverError::malformed(method, format!("invalid JSON body: {}", e)))?;

        parse_envelope(method, body)
    }

    /// Follow `response_metadata.next_cursor` until the listing is exhausted
    async fn list_all(
        &self,
        method: &str,
        field: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<Value>> {
        collect_listing(method, field, &self.retry, &self.listing_limiter, move |cursor| {
            let params = listing_params(extra, cursor);
            async move { self.call(method, &params).await }
        })
        .await
    }
}

fn listing_params<'a>(
    extra: &[(&'a str, String)],
    cursor: Option<String>,
) -> Vec<(&'a str, String)> {
    let mut params = extra.to_vec();
    params.push(("limit", LIST_LIMIT.to_string()));
    if let Some(cursor) = cursor {
        params.push(("cursor", cursor));
    }
    params
}

/// Drive a cursor-paginated listing one page at a time.
///
/// Retries apply per page, so a transient failure on page k resumes at page k
/// instead of discarding the records already received.
pub(crate) async fn collect_listing<F, Fut>(
    method: &str,
    field: &str,
    policy: &RetryPolicy,
    limiter: &RateLimiter,
    mut fetch_page: F,
) -> Result<Vec<Value>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Map<String, Value>>>,
{
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        limiter.acquire().await;
        let mut body = retry(policy, method, || fetch_page(cursor.clone())).await?;
        let batch = take_list(method, &mut body, field)?;
        tracing::debug!(method = %method, records = batch.len(), "Received listing batch");
        records.extend(batch);

        cursor = next_cursor(&body);
        if cursor.is_none() {
            break;
        }
    }

    Ok(records)
}

impl DirectoryService for SlackClient {
    async fn list_users(&self) -> Result<UserDirectory> {
        let records = self.list_all("users.list", "members", &[]).await?;
        tracing::debug!(users = records.len(), "Fetched user directory");
        Ok(UserDirectory::new(records))
    }

    async fn list_channels(&self) -> Result<ChannelDirectory> {
        let extra = [
            ("types", self.config.channel_types.join(",")),
            ("exclude_archived", "false".to_string()),
        ];
        let records = self.list_all("conversations.list", "channels", &extra).await?;
        tracing::debug!(channels = records.len(), "Fetched channel directory");
        Ok(ChannelDirectory::new(records))
    }

    async fn get_channel_page(&self, request: &PageRequest) -> Result<Page> {
        let params = history_params(request);
        let body = self.call("conversations.history", &params).await?;
        parse_page(body)
    }

    async fn post_notification(&self, target: &str, text: &str) -> Result<()> {
        let session = self.client.open_session(&self.token);

        let mut request = SlackApiChatPostMessageRequest::new(
            target.into(),
            SlackMessageContent::new().with_text(text.into()),
        );
        request.username = Some(self.config.notification_username.clone());

        self.with_deadline("chat.postMessage", session.chat_post_message(&request))
            .await?
            .map_err(map_client_error)?;

        Ok(())
    }
}

/// Query for one history page. The cursor goes out as `latest` with
/// `inclusive=false`, so Slack returns only messages strictly older than it.
pub(crate) fn history_params(request: &PageRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("channel", request.channel.as_str().to_string()),
        ("oldest", "0".to_string()),
        ("inclusive", request.inclusive.to_string()),
        ("limit", request.limit.to_string()),
    ];
    if let Some(cursor) = &request.cursor {
        params.push(("latest", cursor.as_str().to_string()));
    }
    params
}

fn map_client_error(err: SlackClientError) -> ArchiverError {
    match err {
        SlackClientError::ApiError(api) => classify_api_error(&api.code),
        SlackClientError::RateLimitError(limit) => ArchiverError::RateLimited {
            retry_after: limit.retry_after,
        },
        other => ArchiverError::Transport(other.to_string()),
    }
}

fn check_status(method: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }

    let detail = format!("{} returned HTTP {}", method, status);
    Err(
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            ArchiverError::Authentication(detail)
        } else if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
            ArchiverError::Transport(detail)
        } else {
            ArchiverError::SlackApi(detail)
        },
    )
}

/// Map a Web API `error` code onto the error taxonomy
pub(crate) fn classify_api_error(code: &str) -> ArchiverError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" => ArchiverError::Authentication(code.to_string()),
        "ratelimited" | "rate_limited" => ArchiverError::RateLimited { retry_after: None },
        "internal_error" | "fatal_error" | "service_unavailable" | "request_timeout" => {
            ArchiverError::Transport(code.to_string())
        }
        _ => ArchiverError::SlackApi(code.to_string()),
    }
}

pub(crate) fn parse_envelope(method: &str, body: Value) -> Result<Map<String, Value>> {
    let Value::Object(envelope) = body else {
        return Err(ArchiverError::malformed(method, "response body is not an object"));
    };

    match envelope.get("ok") {
        Some(Value::Bool(true)) => Ok(envelope),
        Some(Value::Bool(false)) => {
            let code = envelope
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            Err(classify_api_error(code))
        }
        _ => Err(ArchiverError::malformed(method, "missing boolean `ok` field")),
    }
}

pub(crate) fn take_list(
    method: &str,
    envelope: &mut Map<String, Value>,
    field: &str,
) -> Result<Vec<Value>> {
    match envelope.remove(field) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ArchiverError::malformed(
            method,
            format!("`{}` is not a list", field),
        )),
        None => Err(ArchiverError::malformed(
            method,
            format!("missing `{}` field", field),
        )),
    }
}

pub(crate) fn next_cursor(envelope: &Map<String, Value>) -> Option<String> {
    envelope
        .get("response_metadata")
        .and_then(|m| m.get("next_cursor"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

pub(crate) fn parse_page(mut envelope: Map<String, Value>) -> Result<Page> {
    let messages = take_list("conversations.history", &mut envelope, "messages")?
        .into_iter()
        .map(Message::from_value)
        .collect::<Result<Vec<_>>>()?;

    let page = Page::new(messages);
    Ok(match envelope.get("has_more").and_then(Value::as_bool) {
        Some(has_more) => page.with_has_more(has_more),
        None => page,
    })
}

/// `Retry-After` carries delta-seconds on the Web API
pub(crate) fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}
