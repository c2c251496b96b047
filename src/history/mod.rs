//! Paginated channel-history retrieval
//!
//! - `fetcher`: walks a channel's history page by page with an exclusive cursor
//! - `pacing`: minimum-interval rate limiter shared by page and channel loops
//! - `retry`: bounded exponential backoff for transient failures

mod fetcher;
mod pacing;
mod retry;

pub use fetcher::{HistoryFetcher, PAGE_SIZE, Transcript};
pub use pacing::RateLimiter;
pub use retry::{RetryPolicy, retry};
