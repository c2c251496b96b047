//! In-memory workspace used by unit tests

use crate::error::{ArchiverError, Result};
use crate::slack::{
    ChannelDirectory, DirectoryService, Message, Page, PageRequest, UserDirectory,
};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `count` messages, newest first, with strictly decreasing timestamps.
pub(crate) fn message_history(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "type": "message",
                "user": "U024BE7LH",
                "text": format!("message {}", count - i),
                "ts": format!("{}.{:06}", 1_700_000_000 + count - i, 0),
            })
        })
        .collect()
}

pub(crate) fn channel_record(id: &str, name: &str) -> Value {
    json!({"name": name, "id": id, "is_channel": true, "created": 1449252889})
}

/// Emulates the Slack workspace: newest-first history, exclusive cursors,
/// scripted failures and call recording.
#[derive(Default)]
pub(crate) struct FakeWorkspace {
    users: Vec<Value>,
    channels: Vec<Value>,
    histories: HashMap<String, Vec<Value>>,
    report_has_more: bool,
    page_failures: Mutex<HashMap<String, VecDeque<ArchiverError>>>,
    listing_failure: Mutex<Option<ArchiverError>>,
    requests: Mutex<Vec<PageRequest>>,
    notifications: Mutex<Vec<(String, String)>>,
    user_calls: AtomicUsize,
}

impl FakeWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(mut self, users: Vec<Value>) -> Self {
        self.users = users;
        self
    }

    pub fn with_channel(mut self, id: &str, name: &str, history: Vec<Value>) -> Self {
        self.channels.push(channel_record(id, name));
        self.histories.insert(id.to_string(), history);
        self
    }

    pub fn with_channel_record(mut self, record: Value) -> Self {
        self.channels.push(record);
        self
    }

    pub fn with_history(mut self, id: &str, history: Vec<Value>) -> Self {
        self.histories.insert(id.to_string(), history);
        self
    }

    pub fn reporting_has_more(mut self) -> Self {
        self.report_has_more = true;
        self
    }

    /// Queue an error for the next page call on `channel`
    pub fn fail_page(&self, channel: &str, error: ArchiverError) {
        self.page_failures
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail the next user listing
    pub fn fail_listing(&self, error: ArchiverError) {
        *self.listing_failure.lock().unwrap() = Some(error);
    }

    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }
}

impl DirectoryService for FakeWorkspace {
    async fn list_users(&self) -> Result<UserDirectory> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.listing_failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(UserDirectory::new(self.users.clone()))
    }

    async fn list_channels(&self) -> Result<ChannelDirectory> {
        Ok(ChannelDirectory::new(self.channels.clone()))
    }

    async fn get_channel_page(&self, request: &PageRequest) -> Result<Page> {
        let channel = request.channel.as_str();
        let scripted = self
            .page_failures
            .lock()
            .unwrap()
            .get_mut(channel)
            .and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }

        self.requests.lock().unwrap().push(request.clone());

        let history = self
            .histories
            .get(channel)
            .ok_or_else(|| ArchiverError::SlackApi("channel_not_found".to_string()))?;

        let start = match &request.cursor {
            None => 0,
            Some(cursor) => {
                let position = history
                    .iter()
                    .position(|m| m["ts"].as_str() == Some(cursor.as_str()))
                    .ok_or_else(|| ArchiverError::SlackApi("invalid_ts_latest".to_string()))?;
                if request.inclusive {
                    position
                } else {
                    position + 1
                }
            }
        };
        let end = (start + request.limit).min(history.len());

        let messages = history[start..end]
            .iter()
            .cloned()
            .map(Message::from_value)
            .collect::<Result<Vec<_>>>()?;

        let page = Page::new(messages);
        Ok(if self.report_has_more {
            page.with_has_more(end < history.len())
        } else {
            page
        })
    }

    async fn post_notification(&self, target: &str, text: &str) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((target.to_string(), text.to_string()));
        Ok(())
    }
}
