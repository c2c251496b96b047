//! Artifact keys and JSON rendering

use crate::error::{ArchiverError, Result};
use crate::slack::Message;
use serde_json::{Map, Value};

pub const USERS_KEY: &str = "users.json";
pub const CHANNELS_KEY: &str = "channels.json";

/// `<name>/<name>.json`, so the export re-imports under a directory named after the channel.
pub fn channel_key(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ArchiverError::malformed(
            "conversations.list",
            format!("channel name {:?} cannot form an artifact key", name),
        ));
    }
    Ok(format!("{}/{}.json", name, name))
}

/// Directory listings: two-space indent, object keys sorted at every depth.
pub fn render_directory(records: &[Value]) -> Result<String> {
    let sorted: Vec<Value> = records.iter().map(sort_keys).collect();
    Ok(serde_json::to_string_pretty(&sorted)?)
}

/// Transcripts: two-space indent, fields in the order the service sent them.
pub fn render_transcript(messages: &[Message]) -> Result<String> {
    Ok(serde_json::to_string_pretty(messages)?)
}

pub fn notification_text(location: &str) -> String {
    format!("All public channels have been backed up to {}", location)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
