use crate::error::{ArchiverError, Result};
use crate::history::{RateLimiter, RetryPolicy, retry};
use crate::slack::{ChannelId, DirectoryService, Message, PageRequest};

/// Largest page the history endpoint serves; a full page means "ask again".
pub const PAGE_SIZE: usize = 1000;

/// One channel's complete history, newest first, in fetch order.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub channel: ChannelId,
    pub messages: Vec<Message>,
    pub pages: usize,
}

impl Transcript {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Drives paginated history retrieval for a single channel at a time.
///
/// Each page after the first starts strictly after the last message of the
/// previous page, so pages never overlap and no dedup pass is needed.
pub struct HistoryFetcher<'a, D> {
    service: &'a D,
    page_size: usize,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl<'a, D: DirectoryService> HistoryFetcher<'a, D> {
    pub fn new(service: &'a D) -> Self {
        Self {
            service,
            page_size: PAGE_SIZE,
            limiter: RateLimiter::unlimited(),
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, PAGE_SIZE);
        self
    }

    /// Pace page calls, across channels as well as within one
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch every message of `channel`.
    ///
    /// A page call that still fails after the retry policy gives up aborts the
    /// fetch; the partial transcript is dropped.
    pub async fn fetch(&self, channel: &ChannelId) -> Result<Transcript> {
        let mut messages: Vec<Message> = Vec::new();
        let mut request = PageRequest::first(channel.clone(), self.page_size);
        let mut pages = 0;

        loop {
            self.limiter.acquire().await;
            let page = retry(&self.retry, "conversations.history", || {
                self.service.get_channel_page(&request)
            })
            .await?;
            pages += 1;

            let count = page.len();
            let has_more = page.has_more;
            messages.extend(page.messages);

            tracing::debug!(
                channel_id = %channel.as_str(),
                page = pages,
                messages = count,
                ?has_more,
                total = messages.len(),
                "Fetched history page"
            );

            if !self.is_continued(count, has_more) {
                break;
            }

            let cursor = messages.last().and_then(Message::ts).ok_or_else(|| {
                ArchiverError::malformed(
                    "conversations.history",
                    "last message of a non-final page has no `ts`",
                )
            })?;

            if request.cursor.as_ref() == Some(&cursor) {
                return Err(ArchiverError::malformed(
                    "conversations.history",
                    format!("cursor did not advance past {}", cursor.as_str()),
                ));
            }

            request = PageRequest::after(channel.clone(), cursor, self.page_size);
        }

        Ok(Transcript {
            channel: channel.clone(),
            messages,
            pages,
        })
    }

    /// An explicit `has_more` wins; otherwise only a full page continues.
    fn is_continued(&self, count: usize, has_more: Option<bool>) -> bool {
        if count == 0 {
            return false;
        }
        match has_more {
            Some(flag) => flag,
            None => count >= self.page_size,
        }
    }
}
