//! Message records

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Primary key
    pub id: String,
    pub topic: String,
    pub message: String,
    /// ISO 8601 timestamp, supplied by the producer
    pub timestamp: String,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Parse the timestamp. The store never checks it, so this is `None`
    /// for anything that isn't RFC 3339.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// An insert request. Without an `id` the engine assigns the next surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub topic: String,
    pub message: String,
    pub timestamp: String,
}

impl NewMessage {
    pub fn new(
        topic: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Stamp with the current UTC time
    pub fn now(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            topic,
            message,
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub(crate) fn into_message(self, id: String) -> Message {
        Message {
            id,
            topic: self.topic,
            message: self.message,
            timestamp: self.timestamp,
        }
    }
}

impl From<Message> for NewMessage {
    fn from(m: Message) -> Self {
        Self {
            id: Some(m.id),
            topic: m.topic,
            message: m.message,
            timestamp: m.timestamp,
        }
    }
}
