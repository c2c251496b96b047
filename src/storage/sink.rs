use crate::error::Result;
use std::future::Future;

/// Destination for exported artifacts.
///
/// `key` is a slash-delimited relative path such as `general/general.json`.
/// Each `put` must be durable on its own; nothing is assumed across calls.
pub trait ObjectSink {
    fn put(&self, key: &str, body: String) -> impl Future<Output = Result<()>>;

    /// Human-readable destination, e.g. `s3://bucket/prefix`
    fn location(&self) -> String;
}
