use crate::error::{ArchiverError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Slack message timestamp, e.g. `1761520471.000200`. Doubles as the history cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageTs(pub String);

impl MessageTs {
    pub fn new(ts: impl Into<String>) -> Self {
        Self(ts.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A message exactly as the service returned it, field order included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(ArchiverError::malformed(
                "conversations.history",
                format!("message is not an object: {}", other),
            )),
        }
    }

    pub fn ts(&self) -> Option<MessageTs> {
        match self.0.get("ts")? {
            Value::String(s) if !s.is_empty() => Some(MessageTs::new(s.clone())),
            Value::Number(n) => Some(MessageTs::new(n.to_string())),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// The two fields the exporter needs out of a channel record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
}

impl Channel {
    pub fn from_record(record: &Value) -> Result<Self> {
        let field = |key: &str| {
            record
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    ArchiverError::malformed(
                        "conversations.list",
                        format!("channel record without string `{}`: {}", key, record),
                    )
                })
        };

        Ok(Self {
            id: ChannelId::new(field("id")?),
            name: field("name")?,
        })
    }
}

/// Channel listing, kept verbatim for export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelDirectory {
    pub records: Vec<Value>,
}

impl ChannelDirectory {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Parse every record, failing on the first one without an id or name.
    pub fn channels(&self) -> Result<Vec<Channel>> {
        self.records.iter().map(Channel::from_record).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// User listing, kept verbatim for export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDirectory {
    pub records: Vec<Value>,
}

impl UserDirectory {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parameters of one history page call.
///
/// `cursor` is an exclusive (unless `inclusive`) upper bound: history is served
/// newest-first, so the page after a cursor holds strictly older messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub channel: ChannelId,
    pub cursor: Option<MessageTs>,
    pub inclusive: bool,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(channel: ChannelId, limit: usize) -> Self {
        Self {
            channel,
            cursor: None,
            inclusive: true,
            limit,
        }
    }

    pub fn after(channel: ChannelId, cursor: MessageTs, limit: usize) -> Self {
        Self {
            channel,
            cursor: Some(cursor),
            inclusive: false,
            limit,
        }
    }
}

/// One history response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub messages: Vec<Message>,
    /// Explicit continuation flag, when the service reports one
    pub has_more: Option<bool>,
}

impl Page {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            has_more: None,
        }
    }

    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = Some(has_more);
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
