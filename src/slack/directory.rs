use crate::error::Result;
use crate::slack::{ChannelDirectory, Page, PageRequest, UserDirectory};
use std::future::Future;

/// The remote workspace as seen by a backup run.
///
/// Authentication is checked when the implementation is constructed; a rejected
/// credential must surface as [`ArchiverError::Authentication`](crate::ArchiverError)
/// from any method as well.
pub trait DirectoryService {
    fn list_users(&self) -> impl Future<Output = Result<UserDirectory>>;

    fn list_channels(&self) -> impl Future<Output = Result<ChannelDirectory>>;

    fn get_channel_page(&self, request: &PageRequest) -> impl Future<Output = Result<Page>>;

    fn post_notification(&self, target: &str, text: &str) -> impl Future<Output = Result<()>>;
}
