//! Change events decoded from database notifications.
//!
//! The notification payload is a JSON object with either a `table` key
//! (row-level change) or a `channel` key (explicit application
//! broadcast). An event with neither has no identity and is dropped by
//! the listener.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded change notification, the input to fan-out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Source relation, when this is a row-level change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Explicit logical channel, when this is an application broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// INSERT / UPDATE / DELETE, or an application-defined broadcast type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Row image. Absent for DELETE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    /// Previous row image. Present for DELETE (and UPDATE when the
    /// trigger emits it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Value>,
    /// Owning project, when derivable from the trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Owning tenant, when derivable from the trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Emission timestamp from the trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    /// Derive the topic this event fans out on.
    ///
    /// `table` wins over `channel`; an event with neither is
    /// undeliverable and returns `None`.
    pub fn topic(&self) -> Option<String> {
        if let Some(table) = &self.table {
            return Some(format!("table:{table}"));
        }
        self.channel.clone()
    }

    /// The body delivered to recipients before per-recipient filtering.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
